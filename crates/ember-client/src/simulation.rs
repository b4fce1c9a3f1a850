//! Offline simulation: fabricates plausible room traffic.
//!
//! When no server is reachable the driver runs this generator instead of a
//! transport. It produces the same event shapes as live traffic - members
//! joining and chatting on a randomized schedule - so the consumer's room
//! view stays populated.

use crate::config::ClientConfig;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::time::Duration;

const MEMBER_POOL: &[&str] = &[
    "Riley", "Jordan", "Casey", "Morgan", "Avery", "Quinn", "Rowan", "Skyler",
];

const CHAT_LINES: &[&str] = &[
    "hey everyone",
    "anyone else here?",
    "this room is quiet today",
    "brb",
    "what did I miss?",
    "ha, good one",
    "same here",
    "ok that makes sense",
];

/// Maximum number of fabricated members besides the local participant.
const MAX_SYNTHETIC_MEMBERS: usize = 4;

/// A fabricated room occurrence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SimEvent {
    MemberJoined(String),
    Chat { username: String, content: String },
}

/// Generator for fabricated traffic. The roster always starts with just
/// the local participant, so the first event is always a join.
pub struct Simulation {
    rng: StdRng,
    local_name: String,
    roster: Vec<String>,
}

impl Simulation {
    pub fn new(local_name: &str) -> Self {
        Self::with_rng(local_name, StdRng::from_entropy())
    }

    fn with_rng(local_name: &str, rng: StdRng) -> Self {
        Self {
            rng,
            local_name: local_name.to_string(),
            roster: vec![local_name.to_string()],
        }
    }

    /// Current member names, local participant first.
    pub fn roster(&self) -> Vec<String> {
        self.roster.clone()
    }

    /// Randomized pause before the next fabricated event.
    pub fn next_delay(&mut self, config: &ClientConfig) -> Duration {
        let min = config.simulation_min_delay;
        let max = config.simulation_max_delay.max(min);
        if min == max {
            return min;
        }
        let span = (max - min).as_millis() as u64;
        min + Duration::from_millis(self.rng.gen_range(0..=span))
    }

    /// Produce the next fabricated occurrence and update the roster.
    pub fn next_event(&mut self) -> SimEvent {
        let can_join = self.roster.len() <= MAX_SYNTHETIC_MEMBERS;
        let must_join = self.roster.len() == 1;

        if must_join || (can_join && self.rng.gen_bool(0.4)) {
            let name = self.pick_new_member();
            self.roster.push(name.clone());
            SimEvent::MemberJoined(name)
        } else {
            // Someone other than the local participant speaks.
            let speaker_idx = self.rng.gen_range(1..self.roster.len());
            let line_idx = self.rng.gen_range(0..CHAT_LINES.len());
            SimEvent::Chat {
                username: self.roster[speaker_idx].clone(),
                content: CHAT_LINES[line_idx].to_string(),
            }
        }
    }

    fn pick_new_member(&mut self) -> String {
        loop {
            let idx = self.rng.gen_range(0..MEMBER_POOL.len());
            let candidate = MEMBER_POOL[idx];
            if candidate != self.local_name && !self.roster.iter().any(|n| n == candidate) {
                return candidate.to_string();
            }
        }
    }
}
