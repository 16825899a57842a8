//! The process-wide collection of named engines.
//!
//! Registration is explicit (`kvds-cli`'s `main` calls [`EngineRegistry::register`]
//! once per engine before the first lookup) rather than relying on
//! constructor-attribute side effects — registration order is otherwise
//! unobservable and awkward to test.

use std::sync::OnceLock;

use crate::Database;

static GLOBAL: OnceLock<EngineRegistry> = OnceLock::new();

/// One named binding to an algorithm's constructor.
///
/// Multiple entries may alias the same algorithm: their `create` function
/// pointers compare equal (`fn` pointers are `PartialEq` in Rust, comparing
/// the underlying code address), which is how [`EngineRegistry::iter`]
/// consumers — the comparator engine and the CLI's help output — detect
/// aliasing.
#[derive(Clone, Copy)]
pub struct Entry {
    /// Name this entry is looked up by (a long or short form).
    pub name: &'static str,
    /// Human-readable description of the algorithm, shared across aliases.
    pub description: &'static str,
    /// The algorithm's constructor.
    pub create: fn() -> Box<dyn Database>,
}

/// A process-wide, insertion-ordered table of named engines.
///
/// Built once at start-up and read-only thereafter; not thread-safe, since
/// this system has no concurrency to guard against (see the crate-level
/// concurrency notes in `kvds-cli`).
#[derive(Default)]
pub struct EngineRegistry {
    entries: Vec<Entry>,
}

impl EngineRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `name` and `short_name` to `create`, both sharing `description`.
    pub fn register(
        &mut self,
        name: &'static str,
        short_name: &'static str,
        description: &'static str,
        create: fn() -> Box<dyn Database>,
    ) {
        tracing::debug!(name, short_name, "registering engine");
        self.entries.push(Entry {
            name,
            description,
            create,
        });
        self.entries.push(Entry {
            name: short_name,
            description,
            create,
        });
    }

    /// Exact, case-sensitive lookup by name or short name.
    pub fn lookup(&self, name: &str) -> Option<&Entry> {
        self.entries.iter().find(|entry| entry.name == name)
    }

    /// All entries in registration order, aliases included.
    pub fn iter(&self) -> impl Iterator<Item = &Entry> {
        self.entries.iter()
    }

    /// Installs this registry as the process-wide global.
    ///
    /// `kvds-compare`'s `create` function has no way to receive a registry
    /// argument (it must stay a bare `fn() -> Box<dyn Database>` to alias-
    /// compare against other entries), so it reads this instead. Call once,
    /// from `kvds-cli`'s `main`, after every engine has been registered.
    ///
    /// # Panics
    /// Panics if a registry has already been installed.
    pub fn install(self) {
        GLOBAL
            .set(self)
            .unwrap_or_else(|_| panic!("engine registry already installed"));
    }

    /// The process-wide registry installed by [`EngineRegistry::install`].
    ///
    /// # Panics
    /// Panics if no registry has been installed yet.
    pub fn global() -> &'static EngineRegistry {
        GLOBAL.get().expect("engine registry not installed yet")
    }
}
