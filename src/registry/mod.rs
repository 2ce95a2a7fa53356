//! Domain/path registry.
//!
//! # Responsibilities
//! - Hold the fixed sets of region codes, project families and special
//!   projects the proxy recognizes
//! - Answer pure, case-normalizing membership queries
//!
//! # Design Decisions
//! - Tables are compiled into the binary, immutable for the process
//!   lifetime, safe for unrestricted concurrent reads
//! - Byte-sorted slices + binary search, no runtime set construction
//! - Lookups return interned `&'static str` newtypes so downstream code
//!   never re-validates or re-allocates a matched name

use std::fmt;

mod tables;

/// A recognized region/language code, e.g. `zh` or `bat-smg`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegionCode(&'static str);

/// A recognized project family with per-region subdomains, e.g. `wikipedia`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProjectFamily(&'static str);

/// A recognized special project with a single global host, e.g. `upload.wikimedia`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpecialProject(&'static str);

impl RegionCode {
    pub fn as_str(&self) -> &'static str {
        self.0
    }
}

impl ProjectFamily {
    pub fn as_str(&self) -> &'static str {
        self.0
    }
}

impl SpecialProject {
    pub fn as_str(&self) -> &'static str {
        self.0
    }
}

impl fmt::Display for RegionCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

impl fmt::Display for ProjectFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

impl fmt::Display for SpecialProject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

fn lookup(table: &'static [&'static str], name: &str) -> Option<&'static str> {
    if name.bytes().any(|b| b.is_ascii_uppercase()) {
        let lowered = name.to_ascii_lowercase();
        table
            .binary_search(&lowered.as_str())
            .ok()
            .map(|i| table[i])
    } else {
        table.binary_search(&name).ok().map(|i| table[i])
    }
}

/// Look up a region code. Case-insensitive.
pub fn region(code: &str) -> Option<RegionCode> {
    lookup(tables::REGIONS, code).map(RegionCode)
}

/// Look up a project family name. Case-insensitive.
pub fn family(name: &str) -> Option<ProjectFamily> {
    lookup(tables::FAMILIES, name).map(ProjectFamily)
}

/// Look up a special project name (dotted label form). Case-insensitive.
pub fn special(name: &str) -> Option<SpecialProject> {
    lookup(tables::SPECIALS, name).map(SpecialProject)
}

pub fn is_region(code: &str) -> bool {
    region(code).is_some()
}

pub fn is_family(name: &str) -> bool {
    family(name).is_some()
}

pub fn is_special(name: &str) -> bool {
    special(name).is_some()
}
