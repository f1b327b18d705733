use crate::core::PAYLOAD_SIZE;

/// Produces the content of outgoing beacons
pub trait PayloadSource: Send {
    /// Next payload, at most [`PAYLOAD_SIZE`] bytes
    fn next_payload(&mut self) -> Vec<u8>;
}

/// Numbered messages tagged with team and station
#[derive(Debug, Clone)]
pub struct CounterSource {
    team: u32,
    station: u32,
    seq: u64,
}

impl CounterSource {
    /// Creates a source starting at message 0
    pub fn new(team: u32, station: u32) -> Self {
        CounterSource {
            team,
            station,
            seq: 0,
        }
    }

    /// Number of payloads handed out so far
    pub fn produced(&self) -> u64 {
        self.seq
    }
}

impl PayloadSource for CounterSource {
    fn next_payload(&mut self) -> Vec<u8> {
        let mut payload =
            format!("T{}S{} msg {}", self.team, self.station, self.seq).into_bytes();
        payload.truncate(PAYLOAD_SIZE);
        self.seq += 1;
        payload
    }
}
