use crate::areas::repository::Repository;
use crate::artifacts::core::error::GitError;
use crate::artifacts::database::object_access::ObjectAccess;
use crate::artifacts::objects::OBJECT_ID_LENGTH;
use crate::artifacts::objects::object_id::ObjectId;
use crate::artifacts::objects::object_type::ObjectType;
use crate::artifacts::refs::ref_name::RefNameValidator;
use crate::artifacts::refs::{ANCESTOR_REGEX, PARENT_REGEX, REF_ALIASES};
use anyhow::Context;

/// Shortest hex prefix accepted as an abbreviated address
const MIN_ABBREV_LENGTH: usize = 4;

/// A revision expression naming an object
///
/// Supported forms:
/// - reference names: `main`, `refs/tags/v1`, `HEAD`, `@`
/// - full or abbreviated addresses (at least 4 hex digits)
/// - `<revision>^`: first parent
/// - `<revision>~<n>`: n-th first-parent ancestor
///
/// Hex strings are parsed as names and only looked up as addresses when no
/// reference by that name exists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Revision {
    Ref(String),
    Ancestor(Box<Revision>, usize),
    Parent(Box<Revision>),
}

/// Suffix grammar, compiled once per parse
struct SuffixPatterns {
    parent: regex::Regex,
    ancestor: regex::Regex,
}

impl SuffixPatterns {
    fn new() -> anyhow::Result<Self> {
        Ok(SuffixPatterns {
            parent: regex::Regex::new(PARENT_REGEX)
                .with_context(|| format!("invalid parent regex: {PARENT_REGEX}"))?,
            ancestor: regex::Regex::new(ANCESTOR_REGEX)
                .with_context(|| format!("invalid ancestor regex: {ANCESTOR_REGEX}"))?,
        })
    }
}

impl Revision {
    pub fn try_parse(revision: &str, validator: &RefNameValidator) -> anyhow::Result<Revision> {
        Self::parse_with(revision, &SuffixPatterns::new()?, validator)
    }

    fn parse_with(
        revision: &str,
        patterns: &SuffixPatterns,
        validator: &RefNameValidator,
    ) -> anyhow::Result<Revision> {
        if let Some(caps) = patterns.parent.captures(revision) {
            let base = Self::parse_with(&caps[1], patterns, validator)?;
            Ok(Revision::Parent(Box::new(base)))
        } else if let Some(caps) = patterns.ancestor.captures(revision) {
            let generations: usize = caps[2]
                .parse()
                .with_context(|| format!("failed to parse generations in revision: {revision}"))?;
            let base = Self::parse_with(&caps[1], patterns, validator)?;
            Ok(Revision::Ancestor(Box::new(base), generations))
        } else {
            let name = *REF_ALIASES.get(revision).unwrap_or(&revision);
            validator.validate(name)?;
            Ok(Revision::Ref(name.to_string()))
        }
    }

    pub fn resolve(&self, repository: &Repository) -> anyhow::Result<ObjectId> {
        match self {
            Revision::Ref(name) => match repository.refs().resolve(name) {
                Ok(oid) => Ok(oid),
                Err(error) if GitError::is_not_found(&error) && Self::looks_like_oid(name) => {
                    Self::resolve_oid(name, repository)
                }
                Err(error) => Err(error),
            },
            Revision::Parent(base) => Self::first_parent(base.resolve(repository)?, repository),
            Revision::Ancestor(base, generations) => {
                let mut oid = base.resolve(repository)?;
                for _ in 0..*generations {
                    oid = Self::first_parent(oid, repository)?;
                }

                Ok(oid)
            }
        }
    }

    fn first_parent(oid: ObjectId, repository: &Repository) -> anyhow::Result<ObjectId> {
        let (commit_oid, object_type) = repository.peel(&oid)?;
        let commit = repository
            .parse_object_as_commit(&commit_oid)?
            .ok_or_else(|| {
                anyhow::anyhow!("object {} is a {object_type}, not a commit", oid.to_short_oid())
            })?;

        commit
            .parent()
            .copied()
            .ok_or_else(|| GitError::not_found(format!("parent of {}", oid.to_short_oid())).into())
    }

    fn resolve_oid(prefix: &str, repository: &Repository) -> anyhow::Result<ObjectId> {
        if prefix.len() == OBJECT_ID_LENGTH {
            let oid = ObjectId::try_parse(prefix)?;
            if !repository.has_object(&oid)? {
                anyhow::bail!(GitError::not_found(format!("object {oid}")));
            }
            return Ok(oid);
        }

        let matches = repository.find_objects_by_prefix(prefix)?;
        match matches.as_slice() {
            [] => anyhow::bail!(GitError::not_found(format!(
                "ambiguous argument '{prefix}': unknown revision"
            ))),
            [oid] => Ok(*oid),
            candidates => {
                let mut message = format!("short SHA1 {prefix} is ambiguous\nhint: The candidates are:");
                for oid in candidates {
                    let kind = repository
                        .read_object(oid)
                        .map(|raw| raw.object_type)
                        .unwrap_or(ObjectType::Blob);
                    message.push_str(&format!("\nhint:   {} {kind}", oid.to_short_oid()));
                }
                anyhow::bail!(message)
            }
        }
    }

    fn looks_like_oid(name: &str) -> bool {
        (MIN_ABBREV_LENGTH..=OBJECT_ID_LENGTH).contains(&name.len())
            && name.chars().all(|c| c.is_ascii_hexdigit())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rstest::{fixture, rstest};

    #[fixture]
    fn validator() -> RefNameValidator {
        RefNameValidator::new().unwrap()
    }

    fn name(value: &str) -> Revision {
        Revision::Ref(value.to_string())
    }

    #[rstest]
    #[case("main", name("main"))]
    #[case("@", name("HEAD"))]
    #[case("feature/my-feature", name("feature/my-feature"))]
    #[case("main^", Revision::Parent(Box::new(name("main"))))]
    #[case("main^^", Revision::Parent(Box::new(Revision::Parent(Box::new(name("main"))))))]
    #[case("main~3", Revision::Ancestor(Box::new(name("main")), 3))]
    #[case("main~0", Revision::Ancestor(Box::new(name("main")), 0))]
    #[case("a1b2c3d^", Revision::Parent(Box::new(name("a1b2c3d"))))]
    #[case("@~2", Revision::Ancestor(Box::new(name("HEAD")), 2))]
    fn parses_revision_forms(
        validator: RefNameValidator,
        #[case] input: &str,
        #[case] expected: Revision,
    ) {
        pretty_assertions::assert_eq!(Revision::try_parse(input, &validator).unwrap(), expected);
    }

    #[rstest]
    #[case("")]
    #[case(".invalid")]
    #[case(".invalid^")]
    #[case(".invalid~5")]
    #[case("invalid name")]
    #[case("feature..name")]
    #[case("branch.lock")]
    #[case("invalid/")]
    fn rejects_invalid_names(validator: RefNameValidator, #[case] input: &str) {
        assert!(Revision::try_parse(input, &validator).is_err());
    }

    #[rstest]
    fn long_suffix_chains_parse(validator: RefNameValidator) {
        let input = format!("main~2{}", "^".repeat(300));

        let mut current = Revision::try_parse(&input, &validator).unwrap();
        let mut depth = 0;
        while let Revision::Parent(inner) = current {
            depth += 1;
            current = *inner;
        }

        pretty_assertions::assert_eq!(depth, 300);
        pretty_assertions::assert_eq!(current, Revision::Ancestor(Box::new(name("main")), 2));
    }

    #[test]
    fn short_hex_is_not_an_address() {
        assert!(!Revision::looks_like_oid("abc"));
        assert!(Revision::looks_like_oid("abcd"));
        assert!(!Revision::looks_like_oid(&"a".repeat(41)));
        assert!(!Revision::looks_like_oid("main"));
    }

    proptest! {
        #[test]
        fn parent_suffix_wraps_the_base(
            base in "[a-zA-Z0-9][a-zA-Z0-9_-]{0,15}",
            parents in 1usize..5
        ) {
            let validator = RefNameValidator::new().unwrap();
            let input = format!("{base}{}", "^".repeat(parents));

            let mut current = Revision::try_parse(&input, &validator).unwrap();
            for _ in 0..parents {
                let Revision::Parent(inner) = current else {
                    return Err(TestCaseError::fail("expected a parent revision"));
                };
                current = *inner;
            }
            prop_assert_eq!(current, Revision::Ref(base));
        }

        #[test]
        fn ancestor_suffix_keeps_generations(
            oid in "[0-9a-f]{4,40}",
            generations in 0usize..100
        ) {
            let validator = RefNameValidator::new().unwrap();
            let parsed = Revision::try_parse(&format!("{oid}~{generations}"), &validator).unwrap();

            prop_assert_eq!(parsed, Revision::Ancestor(Box::new(Revision::Ref(oid)), generations));
        }
    }
}
