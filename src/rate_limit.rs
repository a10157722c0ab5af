//! Per-process sliding-window rate limiting.
//!
//! Reads and writes are tracked in separate windows so a burst of writes never
//! eats into the read budget.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::error::{DeskflowError, DeskflowResult};

pub const WINDOW: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Read,
    Write,
}

impl Access {
    pub fn as_str(&self) -> &'static str {
        match self {
            Access::Read => "read",
            Access::Write => "write",
        }
    }
}

pub struct RateLimiter {
    read_limit: usize,
    write_limit: usize,
    reads: Mutex<VecDeque<Instant>>,
    writes: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    pub fn new(read_limit: usize, write_limit: usize) -> Self {
        Self {
            read_limit,
            write_limit,
            reads: Mutex::new(VecDeque::new()),
            writes: Mutex::new(VecDeque::new()),
        }
    }

    /// Record one request of kind `access`, or fail if its window is full.
    pub fn check(&self, access: Access) -> DeskflowResult<()> {
        self.check_at(access, Instant::now())
    }

    pub fn check_at(&self, access: Access, now: Instant) -> DeskflowResult<()> {
        let (window, limit) = match access {
            Access::Read => (&self.reads, self.read_limit),
            Access::Write => (&self.writes, self.write_limit),
        };
        let mut stamps = window.lock().unwrap_or_else(|e| e.into_inner());

        while let Some(&oldest) = stamps.front() {
            if now.duration_since(oldest) >= WINDOW {
                stamps.pop_front();
            } else {
                break;
            }
        }

        if stamps.len() >= limit {
            return Err(DeskflowError::RateLimit(format!(
                "Maximum {} requests per minute for {} operations",
                limit,
                access.as_str()
            )));
        }
        stamps.push_back(now);
        Ok(())
    }
}
