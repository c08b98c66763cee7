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
    #[arg(long)]
    version_id: Option<String>,
    /// Directory the object is written to, named after its key
    #[arg(long, default_value = ".")]
    output_dir: PathBuf,
    #[arg(long, default_value = DEFAULT_SETTINGS_FILE)]
    config: PathBuf,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let args = Args::parse();

    eprintln!("Downloading {}/{}", args.bucket, args.key);

    let storage = s3ops::connect(&args.config)?.with_download_dir(&args.output_dir);

    let outcome = storage.fetch_object(&args.bucket, &args.key, args.version_id.as_deref())?;

    if let Some(dl) = outcome.value {
        println!("{} {:>10}", dl.path.display(), dl.bytes);
    }

    Ok(())
}
