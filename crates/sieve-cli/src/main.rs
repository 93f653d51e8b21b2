use clap::{value_parser, Arg, ArgAction, Command, ValueHint};
use rayon::ThreadPoolBuilder;
use sieve_cli::input::Input;
use sieve_cli::runner::Runner;

fn main() -> anyhow::Result<()> {
    env_logger::Builder::default()
        .filter_level(log::LevelFilter::Error)
        .parse_env(env_logger::Env::default().filter_or("SIEVE_LOG", "error,sieve=info"))
        .init();

    let rate = |name: &'static str, help: &'static str| {
        Arg::new(name)
            .long(name)
            .value_parser(value_parser!(f64))
            .help(help)
            .value_hint(ValueHint::Other)
    };

    let matches = Command::new("sieve")
        .version(clap::crate_version!())
        .author("Sieve developers")
        .about("Target-decoy FDR filtering of PSMs, peptides, peptide ions and proteins")
        .arg(
            Arg::new("parameters")
                .required(true)
                .value_parser(clap::builder::NonEmptyStringValueParser::new())
                .help("Path to configuration parameters (JSON file)")
                .value_hint(ValueHint::FilePath),
        )
        .arg(
            Arg::new("identifications")
                .short('i')
                .long("identifications")
                .value_parser(clap::builder::NonEmptyStringValueParser::new())
                .help(
                    "Path to identification records (JSON). Overrides the `psms` file \
                     specified in the configuration file.",
                )
                .value_hint(ValueHint::FilePath),
        )
        .arg(
            Arg::new("protein_groups")
                .short('p')
                .long("protein-groups")
                .value_parser(clap::builder::NonEmptyStringValueParser::new())
                .help(
                    "Path to protein groups (JSON). Overrides the `proteins` file \
                     specified in the configuration file.",
                )
                .value_hint(ValueHint::FilePath),
        )
        .arg(
            Arg::new("output_directory")
                .short('o')
                .long("output_directory")
                .value_parser(clap::builder::NonEmptyStringValueParser::new())
                .help(
                    "Path where filtered results will be written. \
                     Overrides the directory specified in the configuration file.",
                )
                .value_hint(ValueHint::DirPath),
        )
        .arg(
            Arg::new("decoy_tag")
                .long("decoy-tag")
                .value_parser(clap::builder::NonEmptyStringValueParser::new())
                .help("Protein name prefix marking decoys"),
        )
        .arg(rate("psm", "Target PSM-level FDR"))
        .arg(rate("peptide", "Target peptide-level FDR"))
        .arg(rate("ion", "Target peptide ion-level FDR"))
        .arg(rate("protein", "Target protein-level FDR"))
        .arg(
            Arg::new("picked")
                .long("picked")
                .action(ArgAction::SetTrue)
                .help("Compete every target protein against its decoy before protein FDR"),
        )
        .arg(
            Arg::new("razor")
                .long("razor")
                .action(ArgAction::SetTrue)
                .help("Assign shared peptides to a single razor protein"),
        )
        .arg(
            Arg::new("sequential")
                .long("sequential")
                .action(ArgAction::SetTrue)
                .conflicts_with("2d")
                .help("Re-filter accepted PSMs that map to accepted proteins"),
        )
        .arg(
            Arg::new("2d")
                .long("2d")
                .action(ArgAction::SetTrue)
                .help("Re-filter all PSMs of accepted proteins and their decoys"),
        )
        .arg(
            Arg::new("threads")
                .long("threads")
                .value_parser(value_parser!(u16).range(1..))
                .help("Number of worker threads (default = # of CPUs)")
                .value_hint(ValueHint::Other),
        )
        .help_template(
            "{usage-heading} {usage}\n\n\
             {about-with-newline}\n\
             Written by {author-with-newline}Version {version}\n\n\
             {all-args}{after-help}",
        )
        .get_matches();

    let threads = matches
        .get_one::<u16>("threads")
        .map(|&n| n as usize)
        .unwrap_or_else(num_cpus::get);
    ThreadPoolBuilder::new().num_threads(threads).build_global()?;

    let input = Input::from_arguments(matches)?;

    let runner = input.build().and_then(Runner::new)?;
    runner.run()?;

    Ok(())
}
