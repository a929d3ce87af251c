/// Interpreter knobs. Build with `Config::default()` and the `with_*` setters.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Nested user-function applications allowed before evaluation fails.
    pub max_call_depth: usize,
    /// Prepended to synth names that don't already carry it.
    pub synth_prefix: String,
    /// Synth used by `play-note`, before prefixing.
    pub default_synth: String,
    pub default_amp: f64,
    /// Mirror `print` lines to the `cadenza::print` log target.
    pub mirror_print: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            max_call_depth: 1000,
            synth_prefix: "sonic-pi-".to_string(),
            default_synth: "beep".to_string(),
            default_amp: 0.5,
            mirror_print: true,
        }
    }
}

impl Config {
    pub fn with_max_call_depth(mut self, depth: usize) -> Self {
        self.max_call_depth = depth;
        self
    }

    pub fn with_synth_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.synth_prefix = prefix.into();
        self
    }

    pub fn with_default_synth(mut self, synth: impl Into<String>) -> Self {
        self.default_synth = synth.into();
        self
    }

    pub fn with_default_amp(mut self, amp: f64) -> Self {
        self.default_amp = amp;
        self
    }

    pub fn with_mirror_print(mut self, mirror: bool) -> Self {
        self.mirror_print = mirror;
        self
    }

    /// Full engine name for `name`, adding the synth prefix when missing.
    pub fn synth_name(&self, name: &str) -> String {
        if name.starts_with(&self.synth_prefix) {
            name.to_string()
        } else {
            format!("{}{}", self.synth_prefix, name)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_synth_name_prefixing() {
        let config = Config::default();
        assert_eq!(config.synth_name("saw"), "sonic-pi-saw");
        assert_eq!(config.synth_name("sonic-pi-saw"), "sonic-pi-saw");

        let config = config.with_synth_prefix("");
        assert_eq!(config.synth_name("saw"), "saw");
    }

    #[test]
    fn test_builders() {
        let config = Config::default()
            .with_max_call_depth(10)
            .with_default_synth("pluck")
            .with_default_amp(0.8)
            .with_mirror_print(false);
        assert_eq!(config.max_call_depth, 10);
        assert_eq!(config.synth_name(&config.default_synth), "sonic-pi-pluck");
        assert_eq!(config.default_amp, 0.8);
        assert!(!config.mirror_print);
    }
}
