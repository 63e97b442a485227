use super::{
    pack_file::PACK_SIGNATURE,
    pkt_line::{PktLine, PktLineDecoder},
    Error, Result,
};
use bytes::Bytes;
use tracing::{debug, info};

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Channel {
    PackData = 1,
    Progress = 2,
    /// Server-side failure; fatal.
    Fatal = 3,
}

impl TryFrom<u8> for Channel {
    type Error = Error;

    fn try_from(byte: u8) -> Result<Self> {
        match byte {
            1 => Ok(Self::PackData),
            2 => Ok(Self::Progress),
            3 => Ok(Self::Fatal),
            _ => Err(Error::protocol(format!("unknown side-band channel {byte}"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SideBandFrame {
    channel: Channel,
    payload: Bytes,
}

impl SideBandFrame {
    pub fn channel(&self) -> Channel {
        self.channel
    }

    pub fn payload(&self) -> &Bytes {
        &self.payload
    }
}

impl TryFrom<Bytes> for SideBandFrame {
    type Error = Error;

    fn try_from(mut bytes: Bytes) -> Result<Self> {
        if bytes.is_empty() {
            return Err(Error::protocol("side-band frame without a channel byte"));
        }
        let channel = Channel::try_from(bytes[0])?;
        let payload = bytes.split_off(1);
        Ok(Self { channel, payload })
    }
}

/// Collects channel 1 of a side-band multiplexed response.
#[derive(Debug, Default)]
pub struct SideBandDemuxer {
    pack: Vec<u8>,
    multiplexing: bool,
}

impl SideBandDemuxer {
    pub fn new() -> Self {
        Self::default()
    }

    /// True once the first side-band frame has been seen.
    pub fn is_multiplexing(&self) -> bool {
        self.multiplexing
    }

    pub fn push(&mut self, line: PktLine) -> Result<()> {
        let PktLine::Data(bytes) = line else {
            debug!("[remote] Reached flush line!");
            return Ok(());
        };

        if !self.multiplexing && is_acknowledgement(&bytes) {
            debug!(line = %String::from_utf8_lossy(&bytes).trim_end(), "negotiation reply");
            return Ok(());
        }

        let frame = SideBandFrame::try_from(bytes)?;
        self.multiplexing = true;

        match frame.channel {
            Channel::PackData => self.pack.extend_from_slice(&frame.payload),
            Channel::Progress => {
                for progress in format_progress(&frame.payload) {
                    info!("remote: {progress}");
                }
            }
            Channel::Fatal => {
                let message = String::from_utf8_lossy(&frame.payload).trim_end().to_string();
                return Err(Error::RemoteMessage(message));
            }
        }

        Ok(())
    }

    pub fn into_pack(self) -> Vec<u8> {
        self.pack
    }
}

/// Demultiplexes a complete frame sequence into the packfile bytes. Stops at
/// the first frame on the error channel.
pub fn demultiplex<I: IntoIterator<Item = PktLine>>(lines: I) -> Result<Vec<u8>> {
    let mut demuxer = SideBandDemuxer::new();
    for line in lines {
        demuxer.push(line)?;
    }
    Ok(demuxer.into_pack())
}

/// Turns the chunks of an upload-pack response body into the packfile.
///
/// The response is either side-band multiplexed pkt-lines or, when the server
/// did not agree to side-band, a bare `PACK` stream after the `NAK` line.
#[derive(Debug, Default)]
pub struct PackReceiver {
    decoder: PktLineDecoder,
    demuxer: SideBandDemuxer,
    raw: Option<Vec<u8>>,
}

impl PackReceiver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn feed(&mut self, chunk: &[u8]) -> Result<()> {
        if let Some(raw) = self.raw.as_mut() {
            raw.extend_from_slice(chunk);
            return Ok(());
        }

        self.decoder.push(chunk);

        loop {
            if !self.demuxer.is_multiplexing()
                && self.decoder.buffered().starts_with(PACK_SIGNATURE)
            {
                debug!("response carries a raw packfile, skipping side-band demultiplexing");
                self.raw = Some(self.decoder.take_buffered().to_vec());
                return Ok(());
            }

            match self.decoder.next_frame()? {
                Some(line) => self.demuxer.push(line)?,
                None => return Ok(()),
            }
        }
    }

    pub fn finish(self) -> Result<Vec<u8>> {
        if let Some(raw) = self.raw {
            return Ok(raw);
        }
        self.decoder.finish()?;
        Ok(self.demuxer.into_pack())
    }
}

fn is_acknowledgement(line: &[u8]) -> bool {
    line.starts_with(b"NAK") || line.starts_with(b"ACK ")
}

fn format_progress(bytes: &[u8]) -> Vec<String> {
    String::from_utf8_lossy(bytes)
        .split(['\r', '\n'])
        .filter(|v| !v.is_empty())
        .map(|v| v.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::super::pkt_line::encode;
    use super::*;

    fn band(channel: u8, payload: &[u8]) -> PktLine {
        PktLine::new([&[channel][..], payload].concat())
    }

    #[test]
    fn it_concatenates_pack_data_in_order() {
        let lines = vec![
            PktLine::new(b"NAK\n".to_vec()),
            band(2, b"Counting objects: 3\r"),
            band(1, b"PACK"),
            band(2, b"Compressing objects: 100% (2/2), done.\n"),
            band(1, b"\x00\x00\x00\x02"),
            band(1, b"\x00\x00\x00\x00"),
            PktLine::flush(),
        ];
        let pack = demultiplex(lines).unwrap();
        assert_eq!(pack, b"PACK\x00\x00\x00\x02\x00\x00\x00\x00");
    }

    #[test]
    fn it_aborts_on_error_channel() {
        let lines = vec![
            band(1, b"PACK"),
            band(3, b"upload-pack: not our ref\n"),
            band(4, b"never inspected"),
        ];
        match demultiplex(lines) {
            Err(Error::RemoteMessage(msg)) => assert_eq!(msg, "upload-pack: not our ref"),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn it_rejects_unknown_channels() {
        let lines = vec![band(1, b"PACK"), band(9, b"??")];
        assert!(matches!(demultiplex(lines), Err(Error::Protocol(_))));
    }

    #[test]
    fn it_formats_progress() {
        assert_eq!(
            format_progress(b"Counting: 50%\rCounting: 100%\r\nDone\n"),
            vec!["Counting: 50%", "Counting: 100%", "Done"]
        );
    }

    #[test]
    fn it_receives_multiplexed_chunks() {
        let body = [
            encode(b"NAK\n"),
            encode(b"\x01PACK\x00\x00"),
            encode(b"\x02progress\n"),
            encode(b"\x01\x00\x02"),
            b"0000".to_vec(),
        ]
        .concat();

        let mut receiver = PackReceiver::new();
        for chunk in body.chunks(3) {
            receiver.feed(chunk).unwrap();
        }
        assert_eq!(receiver.finish().unwrap(), b"PACK\x00\x00\x00\x02");
    }

    #[test]
    fn it_falls_back_to_raw_pack() {
        let body = [encode(b"NAK\n"), b"PACK\x00\x00\x00\x02rest".to_vec()].concat();

        let mut receiver = PackReceiver::new();
        for chunk in body.chunks(5) {
            receiver.feed(chunk).unwrap();
        }
        assert_eq!(receiver.finish().unwrap(), b"PACK\x00\x00\x00\x02rest");
    }

    #[test]
    fn it_fails_on_truncated_response() {
        let mut receiver = PackReceiver::new();
        receiver.feed(b"0010\x01PACK").unwrap();
        assert!(matches!(receiver.finish(), Err(Error::Protocol(_))));
    }

    #[test]
    fn it_splits_channel_from_payload() {
        let frame = SideBandFrame::try_from(Bytes::from_static(b"\x02Counting objects\n")).unwrap();
        assert_eq!(frame.channel(), Channel::Progress);
        assert_eq!(frame.payload(), &Bytes::from_static(b"Counting objects\n"));

        assert!(SideBandFrame::try_from(Bytes::new()).is_err());
    }
}
