//! Compressed media unit as handed over by the demuxer.

/// A compressed packet of one elementary stream.
/// Timestamps and duration are in the stream's time base.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub stream_index: usize,
    pub pts: Option<i64>,
    pub dts: Option<i64>,
    pub duration: i64,
    pub data: Vec<u8>,
    /// Queue generation at push time; stamped by the queue
    pub(crate) serial: u64,
}

impl Packet {
    /// Create a new packet
    pub fn new(stream_index: usize, pts: Option<i64>, dts: Option<i64>, duration: i64, data: Vec<u8>) -> Self {
        Self {
            stream_index,
            pts,
            dts,
            duration,
            data,
            serial: 0,
        }
    }

    /// Payload size in bytes, as counted by the queue
    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// Generation of the queue this packet was pushed into
    pub fn serial(&self) -> u64 {
        self.serial
    }

    /// Best timestamp for presentation: pts, falling back to dts
    pub fn best_timestamp(&self) -> Option<i64> {
        self.pts.or(self.dts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_best_timestamp() {
        let packet = Packet::new(0, None, Some(40), 40, vec![0; 8]);
        assert_eq!(packet.best_timestamp(), Some(40));

        let packet = Packet::new(0, Some(80), Some(40), 40, vec![0; 8]);
        assert_eq!(packet.best_timestamp(), Some(80));
        assert_eq!(packet.size(), 8);
    }
}
