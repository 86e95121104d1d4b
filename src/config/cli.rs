use clap::Parser;

#[derive(Debug, Clone, Parser)]
#[command(name = "xnat-courier")]
#[command(about = "Consumes folder-ready jobs and uploads DICOM studies to XNAT")]
pub struct CliArgs {
    #[arg(long, default_value = "config.toml")]
    pub config: String,

    #[arg(long, help = "Enable verbose output")]
    pub verbose: bool,
}
