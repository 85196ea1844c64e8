#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerificationLevel {
    /// Operand validity only.
    Fast,
    Standard,
    Full,
}

#[derive(Debug, Clone)]
pub struct VerifierConfig {
    pub level: VerificationLevel,
    pub max_diagnostics: usize,
    pub check_stack: bool,
    pub check_short_forms: bool,
    pub report_unreachable: bool,
}

impl VerifierConfig {
    pub fn for_level(level: VerificationLevel) -> Self {
        match level {
            VerificationLevel::Fast => Self {
                level,
                max_diagnostics: 200,
                check_stack: false,
                check_short_forms: false,
                report_unreachable: false,
            },
            VerificationLevel::Standard => Self {
                level,
                max_diagnostics: 200,
                check_stack: true,
                check_short_forms: true,
                report_unreachable: false,
            },
            VerificationLevel::Full => Self {
                level,
                max_diagnostics: 500,
                check_stack: true,
                check_short_forms: true,
                report_unreachable: true,
            },
        }
    }

    pub fn should_check_stack(&self) -> bool {
        self.check_stack || matches!(self.level, VerificationLevel::Full)
    }

    pub fn should_check_short_forms(&self) -> bool {
        self.check_short_forms || matches!(self.level, VerificationLevel::Full)
    }

    pub fn should_report_unreachable(&self) -> bool {
        self.report_unreachable || matches!(self.level, VerificationLevel::Full)
    }
}

impl Default for VerifierConfig {
    fn default() -> Self {
        Self::for_level(VerificationLevel::Standard)
    }
}
