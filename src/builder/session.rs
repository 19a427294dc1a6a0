//! State shared by all builder invocations of one generation run.
//!
//! The load-address counters, the linker-script memo, the binary table and
//! the second-language module registry are owned by an explicit
//! [`Session`] and passed by reference into the builders that need them.
//! There is one [`TargetState`] per target ISA.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::builder::ldscript::LinkerScripts;
use crate::builder::rules;
use crate::core::graph::{Fragment, Generator, GraphError};
use crate::core::path::{BuildPath, SourcePath};
use crate::core::target::Isa;
use crate::util::config::LinkConfig;

/// The address space ran out before the next executable's range.
#[derive(Debug, Error)]
#[error("no load address left after {last:#x} (step {step:#x})")]
pub struct AddressOverflow {
    pub last: u64,
    pub step: u64,
}

/// Hands out non-overlapping code load addresses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadAddressTable {
    next: u64,
    step: u64,
}

impl LoadAddressTable {
    pub fn new(start: u64, step: u64) -> Self {
        LoadAddressTable { next: start, step }
    }

    /// The address the next executable would get.
    pub fn peek(&self) -> u64 {
        self.next
    }

    /// Take the current address and advance by one step.
    pub fn allocate(&mut self) -> Result<u64, AddressOverflow> {
        let addr = self.next;
        self.next = addr.checked_add(self.step).ok_or(AddressOverflow {
            last: addr,
            step: self.step,
        })?;
        Ok(addr)
    }
}

/// Installation category of a binary in the filesystem image.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum BinCategory {
    #[default]
    Bin,
    Sbin,
}

impl BinCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            BinCategory::Bin => "bin",
            BinCategory::Sbin => "sbin",
        }
    }
}

/// Binaries registered for the filesystem image.
#[derive(Debug, Clone, Default)]
pub struct BinaryTable {
    entries: BTreeMap<BinCategory, Vec<BuildPath>>,
}

impl BinaryTable {
    pub fn register(&mut self, category: BinCategory, bin: BuildPath) {
        self.entries.entry(category).or_default().push(bin);
    }

    /// All binaries, `bin` before `sbin`, each in registration order.
    pub fn iter(&self) -> impl Iterator<Item = (BinCategory, &BuildPath)> {
        self.entries
            .iter()
            .flat_map(|(cat, bins)| bins.iter().map(move |b| (*cat, b)))
    }

    pub fn len(&self) -> usize {
        self.entries.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Modules of the second-language workspace, in discovery order. Registering
/// a module twice keeps the first position.
#[derive(Debug, Clone, Default)]
pub struct RustRegistry {
    apps: Vec<SourcePath>,
    libs: Vec<SourcePath>,
}

impl RustRegistry {
    /// A module that produces an archive.
    pub fn register_app(&mut self, dir: SourcePath) {
        if !self.apps.contains(&dir) {
            self.apps.push(dir);
        }
    }

    /// A library module: its files are dependencies, it has no output.
    pub fn register_lib(&mut self, dir: SourcePath) {
        if !self.libs.contains(&dir) {
            self.libs.push(dir);
        }
    }

    pub fn apps(&self) -> &[SourcePath] {
        &self.apps
    }

    pub fn libs(&self) -> &[SourcePath] {
        &self.libs
    }
}

/// Mutable state of one target.
#[derive(Debug, Clone)]
pub struct TargetState {
    pub addresses: LoadAddressTable,
    pub ldscripts: LinkerScripts,
    pub bins: BinaryTable,
    pub rust: RustRegistry,
}

impl TargetState {
    pub fn new(addresses: LoadAddressTable, ldscript: SourcePath) -> Self {
        TargetState {
            addresses,
            ldscripts: LinkerScripts::new(ldscript),
            bins: BinaryTable::default(),
            rust: RustRegistry::default(),
        }
    }
}

/// Per-target state, created on first use.
#[derive(Debug, Clone)]
pub struct SessionState {
    link: LinkConfig,
    ldscript: SourcePath,
    targets: BTreeMap<Isa, TargetState>,
}

impl SessionState {
    pub fn new(link: LinkConfig, ldscript: SourcePath) -> Self {
        SessionState {
            link,
            ldscript,
            targets: BTreeMap::new(),
        }
    }

    pub fn target(&mut self, isa: Isa) -> &mut TargetState {
        let link = &self.link;
        let ldscript = &self.ldscript;
        self.targets.entry(isa).or_insert_with(|| {
            TargetState::new(
                LoadAddressTable::new(link.start_for(isa), link.step),
                ldscript.clone(),
            )
        })
    }

    pub fn get(&self, isa: Isa) -> Option<&TargetState> {
        self.targets.get(&isa)
    }
}

/// The graph under construction plus the shared state.
#[derive(Debug)]
pub struct Session {
    pub graph: Generator,
    pub state: SessionState,
}

impl Session {
    /// A session with the standard rules registered.
    pub fn new(state: SessionState) -> Result<Self, GraphError> {
        let mut graph = Generator::new();
        rules::register(&mut graph)?;
        Ok(Session { graph, state })
    }

    pub fn merge(&mut self, fragment: Fragment) -> Result<BuildPath, GraphError> {
        self.graph.merge(fragment)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_addresses_strictly_increase() {
        let mut table = LoadAddressTable::new(0xA00000, 0x30000);
        assert_eq!(table.allocate().unwrap(), 0xA00000);
        assert_eq!(table.allocate().unwrap(), 0xA30000);
        assert_eq!(table.peek(), 0xA60000);
    }

    #[test]
    fn test_address_overflow() {
        let mut table = LoadAddressTable::new(u64::MAX - 0x40000, 0x30000);
        assert_eq!(table.allocate().unwrap(), u64::MAX - 0x40000);
        let err = table.allocate().unwrap_err();
        assert_eq!(err.last, u64::MAX - 0x10000);
        // A failed allocation leaves the table where it was.
        assert_eq!(table.peek(), u64::MAX - 0x10000);
    }

    #[test]
    fn test_targets_have_own_counters() {
        let mut state = SessionState::new(
            LinkConfig::default(),
            SourcePath::new("src/toolchain/ld.conf").unwrap(),
        );
        let x = state.target(Isa::X86_64).addresses.allocate().unwrap();
        let r = state.target(Isa::Riscv).addresses.allocate().unwrap();
        assert_eq!(x, 0x100_0000);
        assert_eq!(r, 0x1100_0000);
        assert_eq!(
            state.target(Isa::X86_64).addresses.allocate().unwrap(),
            0x103_0000
        );
    }

    #[test]
    fn test_rust_registry_dedups() {
        let mut reg = RustRegistry::default();
        let a = SourcePath::new("src/apps/a").unwrap();
        let b = SourcePath::new("src/apps/b").unwrap();
        reg.register_app(a.clone());
        reg.register_app(b.clone());
        reg.register_app(a.clone());
        assert_eq!(reg.apps(), &[a, b]);
    }

    #[test]
    fn test_binary_table_order() {
        let mut bins = BinaryTable::default();
        bins.register(BinCategory::Sbin, BuildPath::new("b/pager"));
        bins.register(BinCategory::Bin, BuildPath::new("b/hello"));
        bins.register(BinCategory::Bin, BuildPath::new("b/cat"));
        let order: Vec<_> = bins.iter().map(|(c, b)| (c, b.as_str())).collect();
        assert_eq!(
            order,
            vec![
                (BinCategory::Bin, "b/hello"),
                (BinCategory::Bin, "b/cat"),
                (BinCategory::Sbin, "b/pager")
            ]
        );
    }
}
