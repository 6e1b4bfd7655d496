//! Namespace scoped entry search.

use bon::Builder;
use regex::Regex;

use crate::detect::TypeId;
use crate::entry::EntryRecord;
use crate::error::{Error, Result};
use crate::tree::{ArchiveTree, DirId, EntryId};

/// What to look for and where
///
/// The search starts at [`SearchOptions::dir`] when it is part of the tree, otherwise at the
/// top level directory named by [`SearchOptions::namespace`]; a namespace is always searched
/// with all of its subdirectories. When neither is given the search starts at the root, and when
/// one is given but resolves to nothing there are no results.
#[derive(Debug, Clone, Builder)]
pub struct SearchOptions {
    /// Directory to search in
    pub dir: Option<DirId>,

    /// Top level directory to search in
    #[builder(into)]
    pub namespace: Option<String>,

    /// Name to match, `*` and `?` act as wildcards; case is ignored
    #[builder(into)]
    pub name: Option<String>,

    /// Detected type to match
    pub type_id: Option<TypeId>,

    /// Also match the name with its extension removed
    #[builder(default = true)]
    pub ignore_ext: bool,

    /// Include entries of subdirectories
    #[builder(default)]
    pub search_subdirs: bool,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// Translates a wildcard pattern into an anchored, case insensitive regex
pub fn wildcard_regex(pattern: &str) -> Result<Regex> {
    let mut expr = String::from("(?i)^");
    for c in pattern.chars() {
        match c {
            '*' => expr.push_str(".*"),
            '?' => expr.push('.'),
            c => expr.push_str(&regex::escape(c.encode_utf8(&mut [0; 4]))),
        }
    }
    expr.push('$');

    Regex::new(&expr).map_err(|source| Error::InvalidPattern {
        pattern: pattern.to_owned(),
        source,
    })
}

struct Matcher<'a> {
    name: Option<Regex>,
    type_id: Option<&'a TypeId>,
    ignore_ext: bool,
}

impl Matcher<'_> {
    fn matches(&self, entry: &EntryRecord) -> bool {
        if self.type_id.is_some_and(|t| t != entry.type_id()) {
            return false;
        }
        match &self.name {
            None => true,
            Some(re) => {
                re.is_match(entry.name()) || (self.ignore_ext && re.is_match(entry.name_no_ext()))
            }
        }
    }
}

impl SearchOptions {
    /// The directory to start from and whether to descend, `None` when nothing resolves
    fn scope(&self, tree: &ArchiveTree) -> Option<(DirId, bool)> {
        if let Some(dir) = self.dir.filter(|d| tree.dir(*d).is_some()) {
            return Some((dir, self.search_subdirs));
        }
        if let Some(namespace) = &self.namespace {
            return tree
                .child_named(tree.root(), namespace)
                .map(|dir| (dir, true));
        }
        match self.dir {
            Some(_) => None,
            None => Some((tree.root(), self.search_subdirs)),
        }
    }

    fn matcher(&self) -> Result<Matcher<'_>> {
        Ok(Matcher {
            name: self.name.as_deref().map(wildcard_regex).transpose()?,
            type_id: self.type_id.as_ref(),
            ignore_ext: self.ignore_ext,
        })
    }
}

/// Every matching entry, in flattened order
pub fn find_all(tree: &ArchiveTree, options: &SearchOptions) -> Result<Vec<EntryId>> {
    let Some((dir, recursive)) = options.scope(tree) else {
        return Ok(Vec::new());
    };
    let matcher = options.matcher()?;

    Ok(tree
        .entries_under(dir, recursive)
        .into_iter()
        .filter(|id| tree.record(*id).is_some_and(|r| matcher.matches(r)))
        .collect())
}

/// The first matching entry in flattened order
pub fn find_first(tree: &ArchiveTree, options: &SearchOptions) -> Result<Option<EntryId>> {
    let Some((dir, recursive)) = options.scope(tree) else {
        return Ok(None);
    };
    let matcher = options.matcher()?;

    Ok(tree
        .entries_under(dir, recursive)
        .into_iter()
        .find(|id| tree.record(*id).is_some_and(|r| matcher.matches(r))))
}

/// The last matching entry in flattened order
pub fn find_last(tree: &ArchiveTree, options: &SearchOptions) -> Result<Option<EntryId>> {
    let Some((dir, recursive)) = options.scope(tree) else {
        return Ok(None);
    };
    let matcher = options.matcher()?;

    Ok(tree
        .entries_under(dir, recursive)
        .into_iter()
        .rev()
        .find(|id| tree.record(*id).is_some_and(|r| matcher.matches(r))))
}
