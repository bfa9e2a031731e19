//! Reference store
//!
//! References live under the git directory either as loose files or as lines
//! of `packed-refs`; a loose file always wins over a packed line of the same
//! name.
//!
//! ## File Format
//!
//! A loose reference holds either a 40-character address or `ref: <name>` for
//! a symbolic reference, followed by a newline. `packed-refs` holds
//! `<address> <name>` lines, `^<address>` lines carrying the peeled target of
//! the preceding tag, and `#` comment lines.
//!
//! ## Concurrency
//!
//! Writers are serialized per reference name. An update names the address it
//! expects to replace and fails when another writer got there first.

use crate::areas::storage::Storage;
use crate::artifacts::core::error::GitError;
use crate::artifacts::objects::object_id::ObjectId;
use crate::artifacts::refs::ref_name::{RefNameValidator, lookup_candidates};
use crate::artifacts::refs::{
    HEAD_REF_NAME, HEADS_PREFIX, REF_ALIASES, REFS_PREFIX, REMOTES_PREFIX, TAGS_PREFIX,
};
use crate::artifacts::transport::advertisement::RefAdvertisement;
use anyhow::Context;
use regex::Regex;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

/// Regex pattern for parsing symbolic references
const SYMREF_REGEX: &str = r"^ref: (.+)$";

const PACKED_REFS_FILE: &str = "packed-refs";
const PACKED_REFS_HEADER: &str = "# pack-refs with: sorted \n";

/// What a single reference file says, before any indirection is followed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefValue {
    Direct(ObjectId),
    Symbolic(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackedRef {
    pub oid: ObjectId,
    /// Target of an annotated tag, when recorded
    pub peeled: Option<ObjectId>,
}

#[derive(Debug)]
pub struct Refs {
    storage: Arc<dyn Storage>,
    /// Path to the git directory (typically `.git`)
    path: Box<Path>,
    validator: RefNameValidator,
    symref: Regex,
    max_symref_hops: usize,
    /// One lock per reference name, created on first write
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl Refs {
    pub fn new(
        storage: Arc<dyn Storage>,
        path: impl Into<PathBuf>,
        max_symref_hops: usize,
    ) -> anyhow::Result<Self> {
        Ok(Refs {
            storage,
            path: path.into().into_boxed_path(),
            validator: RefNameValidator::new()?,
            symref: Regex::new(SYMREF_REGEX)?,
            max_symref_hops,
            locks: Mutex::new(HashMap::new()),
        })
    }

    pub fn validator(&self) -> &RefNameValidator {
        &self.validator
    }

    pub fn validate(&self, name: &str) -> anyhow::Result<()> {
        self.validator.validate(name)
    }

    /// Resolve a user-supplied name to an address
    ///
    /// `@` stands for `HEAD`. Other names are tried as given when they start
    /// with `refs/`, then under `refs/`, `refs/heads/` and `refs/tags/`.
    pub fn resolve(&self, name: &str) -> anyhow::Result<ObjectId> {
        for candidate in lookup_candidates(name) {
            if let Some(oid) = self.read_ref(&candidate)? {
                debug!(name, candidate = %candidate, oid = %oid, "resolved reference");
                return Ok(oid);
            }
        }

        anyhow::bail!(GitError::not_found(format!("reference {name}")))
    }

    /// Full name of the reference a user-supplied name stands for, for writing
    ///
    /// Storable names are taken as given. A short name like `main` becomes the
    /// first existing lookup candidate; one that names no reference is
    /// rejected rather than written at the top of the git directory.
    pub fn full_name(&self, name: &str) -> anyhow::Result<String> {
        let name = *REF_ALIASES.get(name).unwrap_or(&name);
        self.validator.validate(name)?;
        if self.validator.validate_storable(name).is_ok() {
            return Ok(name.to_string());
        }

        for candidate in lookup_candidates(name) {
            if self.read_raw(&candidate)?.is_some() {
                return Ok(candidate);
            }
        }

        anyhow::bail!(GitError::InvalidRefName(name.to_string()))
    }

    /// Address a full reference name points at, following symbolic references
    ///
    /// `None` when the chain ends in a reference that does not exist, like
    /// `HEAD` on a branch without commits.
    pub fn read_ref(&self, name: &str) -> anyhow::Result<Option<ObjectId>> {
        Ok(self.follow(name)?.1)
    }

    pub fn read_head(&self) -> anyhow::Result<Option<ObjectId>> {
        self.read_ref(HEAD_REF_NAME)
    }

    /// The reference `HEAD` finally points at, when it is symbolic
    pub fn head_target(&self) -> anyhow::Result<Option<String>> {
        match self.read_raw(HEAD_REF_NAME)? {
            Some(RefValue::Symbolic(_)) => Ok(Some(self.follow(HEAD_REF_NAME)?.0)),
            _ => Ok(None),
        }
    }

    /// Contents of one reference without following it
    pub fn read_raw(&self, name: &str) -> anyhow::Result<Option<RefValue>> {
        if let Some(value) = self.read_loose(name)? {
            return Ok(Some(value));
        }

        Ok(self
            .read_packed()?
            .remove(name)
            .map(|packed| RefValue::Direct(packed.oid)))
    }

    /// Follow symbolic references from `name` to the last name in the chain
    ///
    /// Revisiting a name, or taking more symbolic hops than configured, is a
    /// loop.
    pub fn follow(&self, name: &str) -> anyhow::Result<(String, Option<ObjectId>)> {
        let mut current = name.to_string();
        let mut visited = HashSet::new();
        let mut hops = 0;

        loop {
            if !visited.insert(current.clone()) {
                anyhow::bail!(GitError::Loop(format!(
                    "symbolic reference {name} revisits {current}"
                )));
            }

            match self.read_raw(&current)? {
                None => return Ok((current, None)),
                Some(RefValue::Direct(oid)) => return Ok((current, Some(oid))),
                Some(RefValue::Symbolic(target)) => {
                    hops += 1;
                    if hops > self.max_symref_hops {
                        anyhow::bail!(GitError::Loop(format!(
                            "symbolic reference {name} exceeds {} hops",
                            self.max_symref_hops
                        )));
                    }
                    current = target;
                }
            }
        }
    }

    /// Reference names below `namespace` (e.g. `refs/heads/`), loose and packed
    pub fn list(&self, namespace: &str) -> anyhow::Result<Vec<String>> {
        let prefix = namespace.trim_end_matches('/');
        let mut names = BTreeSet::new();

        for file in self.storage.list(&self.path.join(prefix))? {
            let relative = file
                .to_str()
                .with_context(|| format!("non UTF-8 reference {}", file.display()))?;
            let name = if prefix.is_empty() {
                relative.to_string()
            } else {
                format!("{prefix}/{relative}")
            };

            if self.validator.is_valid(&name) {
                names.insert(name);
            }
        }

        for name in self.read_packed()?.into_keys() {
            if name.starts_with(namespace) {
                names.insert(name);
            }
        }

        Ok(names.into_iter().collect())
    }

    /// Like [`Refs::list`], with each name dereferenced
    ///
    /// Symbolic references whose chain ends nowhere are left out.
    pub fn list_resolved(&self, namespace: &str) -> anyhow::Result<Vec<(String, ObjectId)>> {
        let mut resolved = Vec::new();
        for name in self.list(namespace)? {
            if let Some(oid) = self.read_ref(&name)? {
                resolved.push((name, oid));
            }
        }

        Ok(resolved)
    }

    /// Point the reference at the end of `name`'s chain to `new_oid`
    ///
    /// With `expected_old`, the update only happens when the current address
    /// matches; the zero address means the reference must not exist yet.
    pub fn update_ref(
        &self,
        name: &str,
        new_oid: ObjectId,
        expected_old: Option<ObjectId>,
    ) -> anyhow::Result<()> {
        self.validator.validate_storable(name)?;
        let (target, _) = self.follow(name)?;
        self.validator.validate_storable(&target)?;

        let lock = self.lock_for(&target)?;
        let _guard = lock
            .lock()
            .map_err(|_| anyhow::anyhow!("lock for {target} poisoned"))?;

        let current = match self.read_raw(&target)? {
            Some(RefValue::Direct(oid)) => Some(oid),
            Some(RefValue::Symbolic(other)) => {
                anyhow::bail!("{target} became a symbolic reference to {other} during the update")
            }
            None => None,
        };
        Self::check_expected(&target, current, expected_old)?;

        self.write_ref_file(&target, &format!("{new_oid}\n"))?;
        info!(name, target = %target, oid = %new_oid, "updated reference");

        Ok(())
    }

    pub fn set_symbolic_ref(&self, name: &str, target: &str) -> anyhow::Result<()> {
        self.validator.validate_storable(name)?;
        self.validator.validate_storable(target)?;

        let lock = self.lock_for(name)?;
        let _guard = lock
            .lock()
            .map_err(|_| anyhow::anyhow!("lock for {name} poisoned"))?;

        self.write_ref_file(name, &format!("ref: {target}\n"))?;
        info!(name, target, "set symbolic reference");

        Ok(())
    }

    /// Remove a reference, loose and packed
    ///
    /// Symbolic references are removed themselves, not their targets.
    pub fn delete_ref(&self, name: &str, expected_old: Option<ObjectId>) -> anyhow::Result<()> {
        self.validator.validate_storable(name)?;

        let lock = self.lock_for(name)?;
        let _guard = lock
            .lock()
            .map_err(|_| anyhow::anyhow!("lock for {name} poisoned"))?;

        let current = self
            .read_raw(name)?
            .ok_or_else(|| GitError::not_found(format!("reference {name}")))?;
        if expected_old.is_some() {
            let current_oid = match current {
                RefValue::Direct(oid) => Some(oid),
                RefValue::Symbolic(_) => self.read_ref(name)?,
            };
            Self::check_expected(name, current_oid, expected_old)?;
        }

        self.storage.remove(&self.path.join(name))?;

        let packed_lock = self.lock_for(PACKED_REFS_FILE)?;
        let _packed_guard = packed_lock
            .lock()
            .map_err(|_| anyhow::anyhow!("lock for {PACKED_REFS_FILE} poisoned"))?;
        let mut packed = self.read_packed()?;
        if packed.remove(name).is_some() {
            self.write_packed(&packed)?;
        }

        info!(name, "deleted reference");
        Ok(())
    }

    /// Move every loose direct reference under `refs/` into `packed-refs`
    pub fn pack_refs(&self) -> anyhow::Result<usize> {
        let packed_lock = self.lock_for(PACKED_REFS_FILE)?;
        let _packed_guard = packed_lock
            .lock()
            .map_err(|_| anyhow::anyhow!("lock for {PACKED_REFS_FILE} poisoned"))?;

        let mut packed = self.read_packed()?;
        let mut moved = Vec::new();
        for name in self.list(REFS_PREFIX)? {
            if let Some(RefValue::Direct(oid)) = self.read_loose(&name)? {
                let peeled = packed
                    .get(&name)
                    .filter(|existing| existing.oid == oid)
                    .and_then(|existing| existing.peeled);
                packed.insert(name.clone(), PackedRef { oid, peeled });
                moved.push((name, oid));
            }
        }

        self.write_packed(&packed)?;
        for (name, oid) in &moved {
            let lock = self.lock_for(name)?;
            let _guard = lock
                .lock()
                .map_err(|_| anyhow::anyhow!("lock for {name} poisoned"))?;

            // a ref updated since it was packed keeps its loose value
            if matches!(self.read_loose(name)?, Some(RefValue::Direct(current)) if current == *oid) {
                self.storage.remove(&self.path.join(name))?;
            }
        }

        info!(count = moved.len(), "packed references");
        Ok(moved.len())
    }

    /// Record a remote's advertised references
    ///
    /// Branches land under `refs/remotes/<remote>/`, tags under `refs/tags/`
    /// unless a tag of that name already exists, and an advertised
    /// `symref=HEAD:<branch>` becomes the symbolic `refs/remotes/<remote>/HEAD`.
    /// Returns the names written.
    pub fn apply_advertisement(
        &self,
        remote: &str,
        advertisement: &RefAdvertisement,
    ) -> anyhow::Result<Vec<String>> {
        let remote_prefix = format!("{REMOTES_PREFIX}{remote}");
        self.validator.validate(&remote_prefix)?;

        let mut written = Vec::new();
        for advertised in advertisement.refs() {
            if let Some(branch) = advertised.name.strip_prefix(HEADS_PREFIX) {
                let name = format!("{remote_prefix}/{branch}");
                self.update_ref(&name, advertised.oid, None)?;
                written.push(name);
            } else if advertised.name.starts_with(TAGS_PREFIX) {
                if self.read_raw(&advertised.name)?.is_some() {
                    debug!(name = %advertised.name, "keeping existing tag");
                    continue;
                }
                self.update_ref(&advertised.name, advertised.oid, Some(ObjectId::default()))?;
                written.push(advertised.name.clone());
            }
        }

        if let Some(branch) = advertisement
            .symref_target(HEAD_REF_NAME)
            .and_then(|target| target.strip_prefix(HEADS_PREFIX))
        {
            let name = format!("{remote_prefix}/{HEAD_REF_NAME}");
            self.set_symbolic_ref(&name, &format!("{remote_prefix}/{branch}"))?;
            written.push(name);
        }

        info!(remote, count = written.len(), "applied advertised references");
        Ok(written)
    }

    fn check_expected(
        name: &str,
        current: Option<ObjectId>,
        expected: Option<ObjectId>,
    ) -> anyhow::Result<()> {
        match (expected, current) {
            (None, _) => Ok(()),
            (Some(expected), None) if expected.is_zero() => Ok(()),
            (Some(expected), Some(current)) if expected.is_zero() => {
                anyhow::bail!("cannot create {name}: it already points at {current}")
            }
            (Some(expected), Some(current)) if expected == current => Ok(()),
            (Some(expected), current) => anyhow::bail!(
                "cannot update {name}: expected {expected}, found {}",
                current.map_or_else(|| "nothing".to_string(), |oid| oid.to_string())
            ),
        }
    }

    fn lock_for(&self, name: &str) -> anyhow::Result<Arc<Mutex<()>>> {
        let mut locks = self
            .locks
            .lock()
            .map_err(|_| anyhow::anyhow!("reference lock table poisoned"))?;

        Ok(locks.entry(name.to_string()).or_default().clone())
    }

    fn read_loose(&self, name: &str) -> anyhow::Result<Option<RefValue>> {
        let Some(content) = self.storage.read(&self.path.join(name))? else {
            return Ok(None);
        };

        let content = std::str::from_utf8(&content)
            .map_err(|_| GitError::format(format!("reference {name} is not UTF-8")))?
            .trim();
        if content.is_empty() {
            return Ok(None);
        }

        if let Some(captures) = self.symref.captures(content) {
            return Ok(Some(RefValue::Symbolic(captures[1].to_string())));
        }

        let oid = ObjectId::try_parse(content)
            .map_err(|_| GitError::format(format!("reference {name} holds {content:?}")))?;
        Ok(Some(RefValue::Direct(oid)))
    }

    /// Every line of `packed-refs`, keyed by name
    pub fn read_packed(&self) -> anyhow::Result<BTreeMap<String, PackedRef>> {
        let mut packed = BTreeMap::new();
        let Some(content) = self.storage.read(&self.path.join(PACKED_REFS_FILE))? else {
            return Ok(packed);
        };

        let content = std::str::from_utf8(&content)
            .map_err(|_| GitError::format("packed-refs is not UTF-8"))?;
        let mut last: Option<String> = None;

        for line in content.lines() {
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            if let Some(peeled) = line.strip_prefix('^') {
                let peeled = ObjectId::try_parse(peeled)
                    .map_err(|_| GitError::format(format!("bad peeled line {line:?}")))?;
                let entry = last
                    .as_ref()
                    .and_then(|name| packed.get_mut(name))
                    .ok_or_else(|| GitError::format("peeled line without a reference"))?;
                entry.peeled = Some(peeled);
                continue;
            }

            let (oid, name) = line
                .split_once(' ')
                .ok_or_else(|| GitError::format(format!("bad packed-refs line {line:?}")))?;
            let oid = ObjectId::try_parse(oid)
                .map_err(|_| GitError::format(format!("bad packed-refs line {line:?}")))?;

            packed.insert(name.to_string(), PackedRef { oid, peeled: None });
            last = Some(name.to_string());
        }

        Ok(packed)
    }

    fn write_packed(&self, packed: &BTreeMap<String, PackedRef>) -> anyhow::Result<()> {
        let path = self.path.join(PACKED_REFS_FILE);
        if packed.is_empty() {
            return self.storage.remove(&path);
        }

        let mut content = String::from(PACKED_REFS_HEADER);
        for (name, entry) in packed {
            content.push_str(&format!("{} {name}\n", entry.oid));
            if let Some(peeled) = entry.peeled {
                content.push_str(&format!("^{peeled}\n"));
            }
        }

        self.storage.write(&path, content.as_bytes())
    }

    fn write_ref_file(&self, name: &str, content: &str) -> anyhow::Result<()> {
        self.storage
            .write(&self.path.join(name), content.as_bytes())
            .with_context(|| format!("failed to write reference {name}"))
    }
}
