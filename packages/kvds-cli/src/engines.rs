//! Wires the three shipped engines into an [`EngineRegistry`] and renders
//! the usage/help text the original groups by algorithm identity.

use std::io::Write;

use kvds_core::EngineRegistry;

/// The environment variable that forces the comparator default outside
/// debug builds, so fuzzing doesn't require a separate build.
pub const ALWAYS_COMPARE_VAR: &str = "KVDS_ALWAYS_COMPARE";

/// Registers every engine this binary ships, in the order they should be
/// listed and compared.
pub fn build_registry() -> EngineRegistry {
    let mut registry = EngineRegistry::new();
    registry.register(
        "scapegoat",
        "scg",
        "Store entries in a scapegoat-balanced binary search tree.",
        kvds_scapegoat::create,
    );
    registry.register(
        "linkedlist",
        "lst",
        "Store entries in a sorted doubly-linked list",
        kvds_list::create,
    );
    registry.register(
        "compare",
        "inv",
        "Cross-check every other engine against each other.",
        kvds_compare::create,
    );
    registry
}

/// The engine selected when no name is given on the command line: the
/// comparator under a debug build (or when `KVDS_ALWAYS_COMPARE=1`), the
/// scapegoat tree otherwise.
pub fn default_algorithm_name() -> &'static str {
    let forced = std::env::var(ALWAYS_COMPARE_VAR).is_ok_and(|v| v == "1");
    if forced || cfg!(debug_assertions) {
        "compare"
    } else {
        "scapegoat"
    }
}

/// Prints usage text to `output`, grouping every name that aliases the same
/// algorithm onto one line before its description.
pub fn print_usage(output: &mut impl Write, program: &str, registry: &EngineRegistry) {
    let _ = writeln!(output, "Usage:");
    let _ = writeln!(output, "  {program} [algorithm]\n");
    let _ = write!(output, "Available algorithms:");

    let mut last: Option<kvds_core::Entry> = None;
    for entry in registry.iter().copied() {
        match last {
            Some(prev) if prev.create == entry.create => {
                let _ = write!(output, ", {}", entry.name);
            }
            _ => {
                if let Some(prev) = last {
                    let _ = write!(output, " - {}", prev.description);
                }
                let _ = write!(output, "\n  {}", entry.name);
            }
        }
        last = Some(entry);
    }
    if let Some(prev) = last {
        let _ = write!(output, " - {}", prev.description);
    }
    let _ = writeln!(output);
}
