//! Rewrites calls to the `ArraySlice<T>` indexer into direct accesses of the
//! backing array.
//!
//! For every slice-typed argument or local the weaver caches the slice's
//! `Array` and `Offset` fields in two fresh locals, right at method entry for
//! parameters and right after every store. Each `get_Item`/`set_Item` call
//! whose receiver is a plain load of such a binding is then turned into
//! `ldelem`/`stelem` on the cached array, with the cached offset added to the
//! index.
pub mod config;
pub mod context;
pub mod descriptor;
pub mod error;
pub mod exclude;
pub mod locate;
pub mod materialize;
pub mod reaching;
pub mod report;
pub mod rewrite;
pub mod trace;
pub mod weaver;

pub use config::WeaverConfig;
pub use context::WeaveContext;
pub use descriptor::{Accessor, NotApplicable, SliceDescriptor};
pub use error::{MethodError, WeaveError};
pub use exclude::prune;
pub use locate::{locate, Binding, Candidate, Origin, Shadow};
pub use materialize::materialize;
pub use reaching::{Reach, ReachingSnapshots};
pub use report::{Diagnostic, MethodOutcome, MethodReport, WeaveCode, WeaveReport};
pub use rewrite::{rewrite, RewriteSummary, SkipReason};
pub use trace::StackTracer;
pub use weaver::{WeaveOutcome, Weaver};

#[cfg(test)]
pub(crate) mod testing {
    use slicefold_ir::Module;

    /// The slice library the unit tests weave against.
    pub(crate) fn library() -> Module {
        slicefold_parser::parse_module(include_str!("../test_lib/arrayslice.sfil")).unwrap()
    }
}
