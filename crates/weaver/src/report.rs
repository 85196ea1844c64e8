//! What a weaving run did, method by method.
use std::fmt;

use slicefold_verifier::{Note, Severity};

use crate::{NotApplicable, RewriteSummary};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WeaveCode {
    NotApplicable,
    OptedOut,
    SkippedSite,
}

impl WeaveCode {
    pub const fn as_u16(self) -> u16 {
        match self {
            Self::NotApplicable => 1,
            Self::OptedOut => 2,
            Self::SkippedSite => 100,
        }
    }
}

impl fmt::Display for WeaveCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SW{:04}", self.as_u16())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub code: WeaveCode,
    pub severity: Severity,
    pub message: String,
    /// Qualified name of the method, if the diagnostic concerns one.
    pub method: Option<String>,
    /// IL offset within `method`.
    pub offset: Option<u32>,
    pub notes: Vec<Note>,
}

impl Diagnostic {
    pub fn new(code: WeaveCode, severity: Severity, message: impl Into<String>) -> Self {
        Self {
            code,
            severity,
            message: message.into(),
            method: None,
            offset: None,
            notes: Vec::new(),
        }
    }

    pub fn in_method(mut self, method: impl Into<String>, offset: Option<u32>) -> Self {
        self.method = Some(method.into());
        self.offset = offset;
        self
    }

    pub fn with_note(mut self, message: impl Into<String>) -> Self {
        self.notes.push(Note {
            message: message.into(),
        });
        self
    }
}

impl From<&NotApplicable> for Diagnostic {
    fn from(reason: &NotApplicable) -> Self {
        let severity = match reason {
            NotApplicable::NoReference { .. } => Severity::Info,
            _ => Severity::Warning,
        };
        Self::new(WeaveCode::NotApplicable, severity, reason.to_string())
            .with_note("module left unchanged")
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}] {}", self.severity, self.code, self.message)?;
        match (&self.method, self.offset) {
            (Some(method), Some(offset)) => write!(f, " @ {method}+IL_{offset:04x}")?,
            (Some(method), None) => write!(f, " @ {method}")?,
            _ => {}
        }
        writeln!(f)?;

        for note in &self.notes {
            writeln!(f, "  note: {}", note.message)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MethodOutcome {
    /// The method carries the opt-out marker.
    OptedOut,
    NoCandidates,
    Woven {
        shadow_pairs: usize,
        rewrite: RewriteSummary,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodReport {
    pub name: String,
    pub outcome: MethodOutcome,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WeaveReport {
    pub methods: Vec<MethodReport>,
    /// Annotations of the marker namespace removed from the module.
    pub markers_removed: usize,
    pub diagnostics: Vec<Diagnostic>,
}

impl WeaveReport {
    pub fn method(&self, name: &str) -> Option<&MethodReport> {
        self.methods.iter().find(|method| method.name == name)
    }

    pub fn woven(&self) -> impl Iterator<Item = &MethodReport> {
        self.methods
            .iter()
            .filter(|method| matches!(method.outcome, MethodOutcome::Woven { .. }))
    }

    /// Total number of indexer calls rewritten.
    pub fn rewritten(&self) -> usize {
        self.methods
            .iter()
            .map(|method| match &method.outcome {
                MethodOutcome::Woven { rewrite, .. } => rewrite.rewritten(),
                _ => 0,
            })
            .sum()
    }

    pub fn skipped(&self) -> usize {
        self.methods
            .iter()
            .map(|method| match &method.outcome {
                MethodOutcome::Woven { rewrite, .. } => rewrite.skipped.len(),
                _ => 0,
            })
            .sum()
    }
}

impl fmt::Display for WeaveReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for method in &self.methods {
            match &method.outcome {
                MethodOutcome::OptedOut => writeln!(f, "{}: opted out", method.name)?,
                MethodOutcome::NoCandidates => writeln!(f, "{}: no slice bindings", method.name)?,
                MethodOutcome::Woven {
                    shadow_pairs,
                    rewrite,
                } => writeln!(
                    f,
                    "{}: {} shadow pairs, {} gets, {} sets, {} skipped",
                    method.name,
                    shadow_pairs,
                    rewrite.gets,
                    rewrite.sets,
                    rewrite.skipped.len()
                )?,
            }
        }
        writeln!(f, "markers removed: {}", self.markers_removed)?;

        for diagnostic in &self.diagnostics {
            write!(f, "{diagnostic}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display() {
        let report = WeaveReport {
            methods: vec![
                MethodReport {
                    name: "App.Program::Skip".into(),
                    outcome: MethodOutcome::OptedOut,
                },
                MethodReport {
                    name: "App.Program::Sum".into(),
                    outcome: MethodOutcome::Woven {
                        shadow_pairs: 1,
                        rewrite: RewriteSummary {
                            gets: 2,
                            sets: 0,
                            skipped: Vec::new(),
                        },
                    },
                },
            ],
            markers_removed: 1,
            diagnostics: vec![Diagnostic::new(
                WeaveCode::SkippedSite,
                Severity::Info,
                "receiver is not a single load",
            )
            .in_method("App.Program::Sum", Some(0x1c))],
        };

        insta::assert_snapshot!(report.to_string().trim_end(), @r"
        App.Program::Skip: opted out
        App.Program::Sum: 1 shadow pairs, 2 gets, 0 sets, 0 skipped
        markers removed: 1
        info [SW0100] receiver is not a single load @ App.Program::Sum+IL_001c
        ");
        assert_eq!(report.rewritten(), 2);
        assert_eq!(report.woven().count(), 1);
    }

    #[test]
    fn not_applicable_severity() {
        let missing = NotApplicable::NoReference {
            library: "Corvalius.ArraySlice".into(),
        };
        assert_eq!(Diagnostic::from(&missing).severity, Severity::Info);

        let unresolved = NotApplicable::UnresolvedModule {
            library: "Corvalius.ArraySlice".into(),
        };
        let diag = Diagnostic::from(&unresolved);
        assert_eq!(diag.severity, Severity::Warning);
        assert_eq!(diag.notes.len(), 1);
    }
}
