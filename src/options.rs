use std::path::PathBuf;

use log::LevelFilter;

/// What the driver runs under the collector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// Script file, run as `__main__`.
    Path(PathBuf),

    /// Module name resolved on the search path.
    Module(String),
}

impl Target {
    /// Name shown in reports and passed as `argv[0]`.
    pub fn display_name(&self) -> String {
        match self {
            Target::Path(path) => path.display().to_string(),
            Target::Module(name) => name.clone(),
        }
    }
}

/// Configuration options for fine-coverage derived from the CLI
#[derive(Debug, Clone)]
pub struct Options {
    pub target: Target,

    /// Only trace units whose qualified name starts with this prefix.
    pub cov_prefix: Option<String>,

    /// Arguments after `--`, seen by the script as `argv[1..]`.
    pub script_args: Vec<String>,

    /// When true, emit JSON output instead of human-readable summary.
    pub json_output: bool,

    pub log_level: LevelFilter,
}

impl Options {
    /// Construct an `Options` instance with default values.
    pub fn new(target: Target) -> Self {
        Self {
            target,
            cov_prefix: None,
            script_args: Vec::new(),
            json_output: false,
            log_level: LevelFilter::Warn,
        }
    }

    /// Full `argv` handed to the script.
    pub fn argv(&self) -> Vec<String> {
        std::iter::once(self.target.display_name())
            .chain(self.script_args.iter().cloned())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn argv_starts_with_the_target() {
        let mut options = Options::new(Target::Module("app".into()));
        options.script_args = vec!["--fast".into(), "3".into()];

        assert_eq!(options.argv(), vec!["app", "--fast", "3"]);
        assert_eq!(options.log_level, LevelFilter::Warn);
    }
}
