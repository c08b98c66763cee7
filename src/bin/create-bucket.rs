// Copyright 2023 Mathew Odden <mathewrodden@gmail.com>
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::path::PathBuf;

use clap::Parser;

use s3ops::config::DEFAULT_SETTINGS_FILE;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    bucket: String,
    #[arg(long, default_value = DEFAULT_SETTINGS_FILE)]
    config: PathBuf,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let args = Args::parse();

    eprintln!("Creating private bucket {}", args.bucket);

    let storage = s3ops::connect(&args.config)?;

    let outcome = storage.create_private_bucket(&args.bucket)?;
    if outcome.value.create_status.is_some() && outcome.value.access_block_status.is_none() {
        eprintln!(
            "warning: {} exists but public access could not be blocked",
            args.bucket
        );
    }

    Ok(())
}
