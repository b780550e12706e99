use std::path::PathBuf;

use clap::Parser;

use sbom_inventory::Ecosystem;

#[derive(Parser, Debug)]
#[command(
    name = "sbom-inventory",
    about = "Scan dependency manifests and lock files and emit a normalized SBOM inventory",
    version
)]
pub struct Cli {
    /// Project directories or individual manifest files to scan
    #[arg(default_value = ".")]
    pub paths: Vec<PathBuf>,

    /// Config file [default: ./.sbom-inventory/config.toml, fallback ~/.config/sbom-inventory/config.toml]
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Report format
    #[arg(long, default_value = "terminal", value_name = "FORMAT")]
    pub report: ReportFormat,

    /// Write the report to a file instead of stdout
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Exclude an ecosystem from scanning (repeatable)
    #[arg(long = "exclude-lang", value_name = "ECOSYSTEM")]
    pub exclude_lang: Vec<EcosystemArg>,

    /// List every record, not just the per-ecosystem counts
    #[arg(short, long)]
    pub verbose: bool,

    /// Only print the summary line
    #[arg(short, long, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Exit with code 1 when any file failed to parse
    #[arg(long)]
    pub fail_on_error: bool,

    /// Log filter, overrides the config file (RUST_LOG overrides both)
    #[arg(long, value_name = "LEVEL")]
    pub log_level: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ReportFormat {
    Terminal,
    Json,
    Cyclonedx,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum EcosystemArg {
    Cargo,
    Go,
    Npm,
    Nuget,
    Maven,
    Pypi,
}

impl From<&EcosystemArg> for Ecosystem {
    fn from(arg: &EcosystemArg) -> Self {
        match arg {
            EcosystemArg::Cargo => Ecosystem::Cargo,
            EcosystemArg::Go => Ecosystem::Go,
            EcosystemArg::Npm => Ecosystem::Npm,
            EcosystemArg::Nuget => Ecosystem::Nuget,
            EcosystemArg::Maven => Ecosystem::Maven,
            EcosystemArg::Pypi => Ecosystem::Pypi,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cli = Cli::try_parse_from(["sbom-inventory"]).unwrap();
        assert_eq!(cli.paths, vec![PathBuf::from(".")]);
        assert_eq!(cli.report, ReportFormat::Terminal);
        assert!(!cli.fail_on_error);
    }

    #[test]
    fn test_repeatable_options() {
        let cli = Cli::try_parse_from([
            "sbom-inventory",
            "api",
            "web/package.json",
            "--report",
            "cyclonedx",
            "--exclude-lang",
            "maven",
            "--exclude-lang",
            "nuget",
            "--fail-on-error",
        ])
        .unwrap();
        assert_eq!(cli.paths.len(), 2);
        assert_eq!(cli.report, ReportFormat::Cyclonedx);
        let excluded: Vec<Ecosystem> = cli.exclude_lang.iter().map(Into::into).collect();
        assert_eq!(excluded, vec![Ecosystem::Maven, Ecosystem::Nuget]);
        assert!(cli.fail_on_error);
    }

    #[test]
    fn test_quiet_conflicts_with_verbose() {
        assert!(Cli::try_parse_from(["sbom-inventory", "-q", "-v"]).is_err());
        assert!(Cli::try_parse_from(["sbom-inventory", "--exclude-lang", "ruby"]).is_err());
    }
}
