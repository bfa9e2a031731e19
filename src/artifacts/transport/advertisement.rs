//! Reference advertisement
//!
//! ```text
//! 001e# service=git-upload-pack\n      optional, followed by a flush
//! 0000
//! <oid> HEAD\0multi_ack side-band-64k symref=HEAD:refs/heads/main\n
//! <oid> refs/heads/main\n
//! <oid> refs/tags/v1\n
//! <oid> refs/tags/v1^{}\n              peeled target of the line before
//! 0000
//! ```
//!
//! An empty repository sends a single `<zero oid> capabilities^{}` line.

use crate::artifacts::core::error::GitError;
use crate::artifacts::objects::OBJECT_ID_LENGTH;
use crate::artifacts::objects::object_id::ObjectId;
use crate::artifacts::refs::ref_name::lookup_candidates;
use crate::artifacts::refs::{HEAD_REF_NAME, PEELED_SUFFIX};
use crate::artifacts::transport::pkt_line::{PktLine, PktLineDecoder, PktLineReader};
use bytes::Bytes;
use derive_new::new;
use tokio::io::AsyncRead;
use tracing::debug;

const SERVICE_PREFIX: &str = "# service=";
const CAPABILITIES_REF: &str = "capabilities^{}";
const SYMREF_CAPABILITY: &str = "symref=";

#[derive(Debug, Clone, PartialEq, Eq, new)]
pub struct AdvertisedRef {
    pub name: String,
    pub oid: ObjectId,
    #[new(default)]
    pub peeled: Option<ObjectId>,
}

impl AdvertisedRef {
    pub fn is_head(&self) -> bool {
        self.name == HEAD_REF_NAME
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefAdvertisement {
    refs: Vec<AdvertisedRef>,
    capabilities: Vec<String>,
}

impl RefAdvertisement {
    pub fn new(refs: Vec<AdvertisedRef>, capabilities: Vec<String>) -> Self {
        RefAdvertisement { refs, capabilities }
    }

    /// Parse frames up to the closing flush; frames after it are not consumed
    pub fn parse(lines: impl IntoIterator<Item = anyhow::Result<PktLine>>) -> anyhow::Result<Self> {
        let mut parser = AdvertisementParser::default();
        for line in lines {
            if parser.feed(line?)? {
                return Ok(parser.finish());
            }
        }

        anyhow::bail!(GitError::format("reference advertisement is not terminated by a flush"))
    }

    pub fn parse_bytes(data: &[u8]) -> anyhow::Result<Self> {
        Self::parse(PktLineDecoder::new(data))
    }

    /// Read an advertisement off the front of a transport stream
    pub async fn read_from<R: AsyncRead + Unpin>(
        reader: &mut PktLineReader<R>,
    ) -> anyhow::Result<Self> {
        let mut parser = AdvertisementParser::default();
        while let Some(line) = reader.read_next().await? {
            if parser.feed(line)? {
                return Ok(parser.finish());
            }
        }

        anyhow::bail!(GitError::format("reference advertisement is not terminated by a flush"))
    }

    pub fn refs(&self) -> &[AdvertisedRef] {
        &self.refs
    }

    pub fn capabilities(&self) -> &[String] {
        &self.capabilities
    }

    pub fn is_empty(&self) -> bool {
        self.refs.is_empty()
    }

    pub fn has_capability(&self, name: &str) -> bool {
        self.capabilities
            .iter()
            .any(|capability| capability == name || capability.starts_with(&format!("{name}=")))
    }

    /// Target of a `symref=<name>:<target>` capability
    pub fn symref_target(&self, name: &str) -> Option<&str> {
        self.capabilities.iter().find_map(|capability| {
            let (source, target) = capability.strip_prefix(SYMREF_CAPABILITY)?.split_once(':')?;
            (source == name).then_some(target)
        })
    }

    pub fn get(&self, name: &str) -> Option<&AdvertisedRef> {
        self.refs.iter().find(|advertised| advertised.name == name)
    }

    /// Find an advertised ref by short or full name, in lookup order
    pub fn resolve(&self, name: &str) -> anyhow::Result<&AdvertisedRef> {
        lookup_candidates(name)
            .iter()
            .find_map(|candidate| self.get(candidate))
            .ok_or_else(|| GitError::not_found(format!("advertised ref {name}")).into())
    }

    pub fn encode(&self) -> anyhow::Result<Bytes> {
        let mut out = Vec::new();
        let capabilities = self.capabilities.join(" ");

        match self.refs.split_first() {
            None => {
                let line = format!("{} {CAPABILITIES_REF}\0{capabilities}\n", ObjectId::default());
                PktLine::data(line).encode_into(&mut out)?;
            }
            Some((first, rest)) => {
                let line = format!("{} {}\0{capabilities}\n", first.oid, first.name);
                PktLine::data(line).encode_into(&mut out)?;
                Self::encode_peeled(first, &mut out)?;

                for advertised in rest {
                    let line = format!("{} {}\n", advertised.oid, advertised.name);
                    PktLine::data(line).encode_into(&mut out)?;
                    Self::encode_peeled(advertised, &mut out)?;
                }
            }
        }
        PktLine::Flush.encode_into(&mut out)?;

        Ok(out.into())
    }

    fn encode_peeled(advertised: &AdvertisedRef, out: &mut Vec<u8>) -> anyhow::Result<()> {
        if let Some(peeled) = advertised.peeled {
            let line = format!("{peeled} {}{PEELED_SUFFIX}\n", advertised.name);
            PktLine::data(line).encode_into(out)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
enum ParseState {
    #[default]
    Start,
    ServicePreamble,
    Refs,
}

#[derive(Debug, Default)]
struct AdvertisementParser {
    state: ParseState,
    refs: Vec<AdvertisedRef>,
    capabilities: Option<Vec<String>>,
}

impl AdvertisementParser {
    /// Consume one frame; true once the advertisement is complete
    fn feed(&mut self, line: PktLine) -> anyhow::Result<bool> {
        match (self.state, line) {
            (ParseState::Start, PktLine::Data(payload))
                if payload.starts_with(SERVICE_PREFIX.as_bytes()) =>
            {
                debug!(
                    service = %String::from_utf8_lossy(&payload).trim_end(),
                    "skipping service preamble"
                );
                self.state = ParseState::ServicePreamble;
                Ok(false)
            }
            (ParseState::ServicePreamble, PktLine::Flush) => {
                self.state = ParseState::Refs;
                Ok(false)
            }
            (ParseState::ServicePreamble, other) => anyhow::bail!(GitError::format(format!(
                "expected a flush after the service preamble, got {other:?}"
            ))),
            (_, PktLine::Flush) => Ok(true),
            (_, PktLine::Data(payload)) => {
                self.state = ParseState::Refs;
                self.parse_line(&payload)?;
                Ok(false)
            }
            (_, other) => anyhow::bail!(GitError::format(format!(
                "unexpected {other:?} in reference advertisement"
            ))),
        }
    }

    fn parse_line(&mut self, payload: &[u8]) -> anyhow::Result<()> {
        let line = std::str::from_utf8(payload)
            .map_err(|_| GitError::format("reference advertisement line is not UTF-8"))?;
        let line = line.strip_suffix('\n').unwrap_or(line);

        let line = match (self.capabilities.is_none(), line.split_once('\0')) {
            (true, Some((reference, capabilities))) => {
                self.capabilities = Some(
                    capabilities
                        .split(' ')
                        .filter(|capability| !capability.is_empty())
                        .map(str::to_string)
                        .collect(),
                );
                reference
            }
            (true, None) => {
                self.capabilities = Some(Vec::new());
                line
            }
            (false, Some(_)) => {
                anyhow::bail!(GitError::format("capabilities after the first advertised ref"))
            }
            (false, None) => line,
        };

        if line.len() < OBJECT_ID_LENGTH + 2 || line.as_bytes()[OBJECT_ID_LENGTH] != b' ' {
            anyhow::bail!(GitError::format(format!(
                "malformed reference advertisement line {line:?}"
            )));
        }
        let oid = ObjectId::try_parse(&line[..OBJECT_ID_LENGTH])?;
        let name = &line[OBJECT_ID_LENGTH + 1..];

        if name == CAPABILITIES_REF {
            if !oid.is_zero() || !self.refs.is_empty() {
                anyhow::bail!(GitError::format("capabilities^{} must be the only, zero-address line"));
            }
            return Ok(());
        }

        if let Some(base) = name.strip_suffix(PEELED_SUFFIX) {
            let previous = self
                .refs
                .last_mut()
                .filter(|previous| previous.name == base && previous.peeled.is_none())
                .ok_or_else(|| {
                    GitError::format(format!("peeled line for {base} does not follow its ref"))
                })?;
            previous.peeled = Some(oid);
            return Ok(());
        }

        self.refs.push(AdvertisedRef::new(name.to_string(), oid));
        Ok(())
    }

    fn finish(self) -> RefAdvertisement {
        RefAdvertisement::new(self.refs, self.capabilities.unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifacts::transport::pkt_line::encode_lines;
    use rstest::{fixture, rstest};

    fn oid(seed: &str) -> ObjectId {
        ObjectId::digest(seed.as_bytes())
    }

    #[fixture]
    fn advertisement() -> RefAdvertisement {
        let mut tag = AdvertisedRef::new("refs/tags/v1".to_string(), oid("tag"));
        tag.peeled = Some(oid("main"));

        RefAdvertisement::new(
            vec![
                AdvertisedRef::new("HEAD".to_string(), oid("main")),
                AdvertisedRef::new("refs/heads/main".to_string(), oid("main")),
                AdvertisedRef::new("refs/heads/topic".to_string(), oid("topic")),
                tag,
            ],
            vec![
                "multi_ack".to_string(),
                "side-band-64k".to_string(),
                "symref=HEAD:refs/heads/main".to_string(),
            ],
        )
    }

    #[rstest]
    fn encoded_advertisement_parses_back(advertisement: RefAdvertisement) {
        let bytes = advertisement.encode().unwrap();

        pretty_assertions::assert_eq!(RefAdvertisement::parse_bytes(&bytes).unwrap(), advertisement);
    }

    #[rstest]
    fn capabilities_and_symref(advertisement: RefAdvertisement) {
        assert!(advertisement.has_capability("side-band-64k"));
        assert!(advertisement.has_capability("symref"));
        assert!(!advertisement.has_capability("thin-pack"));
        pretty_assertions::assert_eq!(advertisement.symref_target("HEAD"), Some("refs/heads/main"));
    }

    #[rstest]
    #[case("main", "refs/heads/main")]
    #[case("v1", "refs/tags/v1")]
    #[case("@", "HEAD")]
    #[case("refs/heads/topic", "refs/heads/topic")]
    fn resolve_uses_lookup_order(
        advertisement: RefAdvertisement,
        #[case] name: &str,
        #[case] expected: &str,
    ) {
        pretty_assertions::assert_eq!(advertisement.resolve(name).unwrap().name, expected);
    }

    #[rstest]
    fn resolve_unknown_is_not_found(advertisement: RefAdvertisement) {
        assert!(GitError::is_not_found(&advertisement.resolve("nope").unwrap_err()));
    }

    #[test]
    fn service_preamble_is_skipped() {
        let first = format!("{} refs/heads/main\0agent=git/2\n", oid("main"));
        let bytes = encode_lines(&[
            PktLine::data("# service=git-upload-pack\n"),
            PktLine::Flush,
            PktLine::data(first),
            PktLine::Flush,
        ])
        .unwrap();

        let parsed = RefAdvertisement::parse_bytes(&bytes).unwrap();
        pretty_assertions::assert_eq!(parsed.refs().len(), 1);
        pretty_assertions::assert_eq!(parsed.capabilities(), &["agent=git/2".to_string()]);
    }

    #[test]
    fn empty_repository_advertises_capabilities_only() {
        let advertisement = RefAdvertisement::new(vec![], vec!["ofs-delta".to_string()]);
        let bytes = advertisement.encode().unwrap();
        let parsed = RefAdvertisement::parse_bytes(&bytes).unwrap();

        assert!(parsed.is_empty());
        assert!(parsed.has_capability("ofs-delta"));
    }

    #[rstest]
    #[case::orphan_peel(format!("{} refs/tags/v1^{{}}\n", oid("x")))]
    #[case::short_line("abc refs/heads/main\n".to_string())]
    #[case::nonzero_capabilities(format!("{} capabilities^{{}}\0ofs-delta\n", oid("x")))]
    fn malformed_lines_are_rejected(#[case] line: String) {
        let bytes = encode_lines(&[PktLine::data(line), PktLine::Flush]).unwrap();

        assert!(RefAdvertisement::parse_bytes(&bytes).is_err());
    }

    #[test]
    fn missing_flush_is_rejected() {
        let line = format!("{} refs/heads/main\0\n", oid("main"));
        let bytes = PktLine::data(line).encode().unwrap();

        assert!(RefAdvertisement::parse_bytes(&bytes).is_err());
    }

    #[tokio::test]
    async fn async_read_leaves_the_rest_of_the_stream() {
        let mut bytes = advertisement().encode().unwrap().to_vec();
        bytes.extend_from_slice(&PktLine::data("NAK\n").encode().unwrap());

        let mut reader = PktLineReader::new(&bytes[..]);
        let parsed = RefAdvertisement::read_from(&mut reader).await.unwrap();

        pretty_assertions::assert_eq!(parsed.refs().len(), 4);
        pretty_assertions::assert_eq!(
            reader.read_next().await.unwrap(),
            Some(PktLine::data("NAK\n"))
        );
    }
}
