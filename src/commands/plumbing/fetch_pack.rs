use crate::areas::repository::Repository;
use crate::artifacts::core::error::GitError;
use crate::artifacts::database::object_access::ObjectAccess;
use crate::artifacts::pack::pack_file::PackFile;
use crate::artifacts::transport::advertisement::RefAdvertisement;
use crate::artifacts::transport::pkt_line::{PktLine, PktLineReader, SideBand};
use bytes::BytesMut;
use std::sync::Arc;
use tokio::io::AsyncRead;
use tracing::{debug, info};

impl Repository {
    /// Receive a side-band multiplexed pack and publish it
    ///
    /// Negotiation replies (`ACK`, `NAK`) are skipped and progress messages are
    /// logged. Returns `None` when the server sent no pack data.
    pub async fn fetch_pack<R: AsyncRead + Unpin>(
        &self,
        lines: &mut PktLineReader<R>,
    ) -> anyhow::Result<Option<Arc<PackFile>>> {
        let mut data = BytesMut::new();

        while let Some(line) = lines.read_next().await? {
            let payload = match line {
                PktLine::Data(payload) => payload,
                PktLine::Flush | PktLine::ResponseEnd => break,
                PktLine::Delimiter => continue,
            };

            if payload.starts_with(b"NAK") || payload.starts_with(b"ACK ") {
                debug!(reply = %String::from_utf8_lossy(&payload).trim_end(), "negotiation reply");
                continue;
            }

            match SideBand::demux(&payload)? {
                SideBand::Data(chunk) => data.extend_from_slice(&chunk),
                SideBand::Progress(message) => {
                    info!(remote = %String::from_utf8_lossy(&message).trim_end(), "progress");
                }
                SideBand::Error(message) => {
                    anyhow::bail!("remote error: {}", String::from_utf8_lossy(&message).trim_end())
                }
            }
        }

        if data.is_empty() {
            return Ok(None);
        }

        let pack = PackFile::parse(data.freeze(), self.config())?;
        pack.verify()?;

        Ok(Some(self.packs().publish(pack)?))
    }

    /// Fetch from a remote speaking the upload-pack response stream
    ///
    /// Reads the reference advertisement, then the pack, and only once every
    /// advertised object is present updates the remote-tracking references.
    /// Returns the references written.
    pub async fn fetch<R: AsyncRead + Unpin>(
        &self,
        reader: R,
        remote: &str,
    ) -> anyhow::Result<Vec<String>> {
        let mut lines = PktLineReader::new(reader);
        let advertisement = RefAdvertisement::read_from(&mut lines).await?;
        if advertisement.is_empty() {
            info!(remote, "remote has no references");
            return Ok(Vec::new());
        }

        if let Some(pack) = self.fetch_pack(&mut lines).await? {
            info!(remote, pack = %pack.checksum(), objects = pack.len(), "received pack");
        }

        for advertised in advertisement.refs() {
            if !self.has_object(&advertised.oid)? {
                anyhow::bail!(GitError::not_found(format!(
                    "object {} for {} was not received",
                    advertised.oid, advertised.name
                )));
            }
        }

        self.refs().apply_advertisement(remote, &advertisement)
    }
}
