use clap::Parser;

/// Marks SMLC/MMLC local-coincidence flags on detector pulse frames
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct CliArgs {
    /// A YAML file with coincidence parameters and geometry overrides
    #[arg(short, long)]
    pub config: Option<String>,

    /// Frame processing mode: 0 = isolated frames, 1 = joined stream
    #[arg(short, long, default_value_t = 0, value_parser = clap::value_parser!(u8).range(0..=1))]
    pub mode: u8,

    /// Minimum tick gap between consecutive joined frames
    #[arg(short, long, default_value_t = 100)]
    pub gap: i64,

    /// Frame files to process
    #[arg(required = true)]
    pub files: Vec<String>,
}

impl CliArgs {
    pub fn do_parse() -> CliArgs {
        CliArgs::parse()
    }
}
