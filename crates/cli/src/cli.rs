use std::path::PathBuf;

use clap::Parser;

/// Batch parser for clinical trial eligibility criteria.
#[derive(Parser)]
#[command(
    name = "elig",
    version,
    about = "Parse clinical trial eligibility criteria into structured relations"
)]
pub struct Cli {
    /// Config file supplying the variable and unit dictionary paths.
    #[arg(long = "conf", value_name = "PATH")]
    pub conf: PathBuf,

    /// Input JSON file of studies. Reads stdin when omitted.
    #[arg(short, long, value_name = "PATH")]
    pub input: Option<PathBuf>,

    /// Output path for the parsed-studies JSON. Writes stdout when omitted.
    #[arg(short, long, value_name = "PATH")]
    pub output: Option<PathBuf>,
}
