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
    key: String,
    #[arg(long, default_value = DEFAULT_SETTINGS_FILE)]
    config: PathBuf,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let args = Args::parse();

    eprintln!("Listing versions of {}/{}", args.bucket, args.key);

    let storage = s3ops::connect(&args.config)?;

    for version in storage.list_versions(&args.bucket, &args.key)?.into_value() {
        println!("{}", version);
    }

    Ok(())
}
