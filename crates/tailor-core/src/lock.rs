//! Advisory lock on a stored object, carried in its `Lock` tag.
//!
//! The store has no compare-and-swap, so two workers can read `False` in the
//! same window and both claim the lock, and a worker that times out proceeds
//! without the lock at all. Ordering is best-effort.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use tailor_domain::EMPTY_INDEX_BODY;
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::store::{ObjectStore, StoreResult};

pub const LOCK_TAG: &str = "Lock";
pub const LOCKED: &str = "True";
pub const UNLOCKED: &str = "False";

/// Timing knobs for [`LockCoordinator::acquire`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockPolicy {
    /// Lower bound of the per-acquisition timeout window.
    pub timeout_min: Duration,
    /// Upper bound of the per-acquisition timeout window.
    pub timeout_max: Duration,
    /// Each poll is preceded by a sleep drawn from `[0, max_jitter)`.
    pub max_jitter: Duration,
    /// Pause after seeing the lock held by someone else.
    pub retry_delay: Duration,
    /// Fixed RNG seed; OS entropy when unset.
    pub seed: Option<u64>,
}

impl Default for LockPolicy {
    fn default() -> Self {
        Self {
            timeout_min: Duration::from_secs(300),
            timeout_max: Duration::from_secs(600),
            max_jitter: Duration::from_secs(5),
            retry_delay: Duration::from_secs(2),
            seed: None,
        }
    }
}

/// How the caller came to hold the lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum LockOutcome {
    /// The tag read `False` and was flipped.
    Acquired,
    /// The object did not exist and was created already locked.
    Created,
    /// The timeout elapsed with the lock still held elsewhere; the caller
    /// proceeds without owning it.
    Escaped,
}

impl LockOutcome {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Acquired => "acquired",
            Self::Created => "created",
            Self::Escaped => "escaped",
        }
    }
}

impl fmt::Display for LockOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LockState {
    Unknown,
    Unlocked,
    LockedByOther,
    /// Object present but its tag is missing or unrecognised.
    Undecided,
    Absent,
    TimedOut,
    LockedBySelf(LockOutcome),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockHandle {
    bucket: String,
    key: String,
    outcome: LockOutcome,
    waited: Duration,
    polls: u32,
}

impl LockHandle {
    #[must_use]
    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    #[must_use]
    pub fn outcome(&self) -> LockOutcome {
        self.outcome
    }

    /// Time between the start of `acquire` and holding the lock.
    #[must_use]
    pub fn waited(&self) -> Duration {
        self.waited
    }

    /// Number of tag reads it took.
    #[must_use]
    pub fn polls(&self) -> u32 {
        self.polls
    }
}

pub struct LockCoordinator {
    store: Arc<dyn ObjectStore>,
    clock: Arc<dyn Clock>,
    policy: LockPolicy,
    rng: Mutex<StdRng>,
}

impl fmt::Debug for LockCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockCoordinator")
            .field("store", &self.store.describe())
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl LockCoordinator {
    pub fn new(store: Arc<dyn ObjectStore>, clock: Arc<dyn Clock>, policy: LockPolicy) -> Self {
        let rng = match policy.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            store,
            clock,
            policy,
            rng: Mutex::new(rng),
        }
    }

    #[must_use]
    pub fn policy(&self) -> &LockPolicy {
        &self.policy
    }

    fn draw_timeout(&self) -> Duration {
        let (low, high) = if self.policy.timeout_min <= self.policy.timeout_max {
            (self.policy.timeout_min, self.policy.timeout_max)
        } else {
            (self.policy.timeout_max, self.policy.timeout_min)
        };
        let span = high - low;
        let fraction: f64 = self.rng().gen();
        low + span.mul_f64(fraction)
    }

    fn draw_jitter(&self) -> Duration {
        let fraction: f64 = self.rng().gen();
        self.policy.max_jitter.mul_f64(fraction)
    }

    fn rng(&self) -> MutexGuard<'_, StdRng> {
        self.rng.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn observe(&self, bucket: &str, key: &str) -> StoreResult<LockState> {
        match self.store.get_tag(bucket, key, LOCK_TAG) {
            Ok(Some(value)) if value == UNLOCKED => Ok(LockState::Unlocked),
            Ok(Some(value)) if value == LOCKED => Ok(LockState::LockedByOther),
            Ok(other) => {
                debug!(bucket, key, tag = ?other, "lock tag not set");
                Ok(LockState::Undecided)
            }
            Err(err) if err.is_absent() => Ok(LockState::Absent),
            Err(err) => Err(err),
        }
    }

    /// Blocks until the lock on `bucket/key` is held, the object has been
    /// created locked, or the randomized timeout elapses.
    ///
    /// # Errors
    /// Returns any store error other than the object being absent.
    pub fn acquire(&self, bucket: &str, key: &str) -> StoreResult<LockHandle> {
        let timeout = self.draw_timeout();
        let started = self.clock.elapsed();
        let mut state = LockState::Unknown;
        let mut polls = 0u32;
        debug!(bucket, key, timeout_secs = timeout.as_secs(), "waiting for index lock");
        loop {
            state = match state {
                LockState::Unknown => {
                    self.clock.sleep(self.draw_jitter());
                    polls += 1;
                    self.observe(bucket, key)?
                }
                LockState::Unlocked => {
                    self.store.put_tag(bucket, key, LOCK_TAG, LOCKED)?;
                    LockState::LockedBySelf(LockOutcome::Acquired)
                }
                LockState::Absent => {
                    info!(bucket, key, "object does not exist, creating it locked");
                    self.store
                        .put_object(bucket, key, EMPTY_INDEX_BODY, &[(LOCK_TAG, LOCKED)])?;
                    LockState::LockedBySelf(LockOutcome::Created)
                }
                LockState::LockedByOther | LockState::Undecided => {
                    let elapsed = self.clock.elapsed().saturating_sub(started);
                    if elapsed >= timeout {
                        LockState::TimedOut
                    } else {
                        if state == LockState::LockedByOther {
                            debug!(bucket, key, polls, "lock held elsewhere");
                            self.clock.sleep(self.policy.retry_delay);
                        }
                        LockState::Unknown
                    }
                }
                LockState::TimedOut => {
                    warn!(
                        bucket,
                        key,
                        timeout_secs = timeout.as_secs(),
                        "lock wait timed out, proceeding without the lock"
                    );
                    LockState::LockedBySelf(LockOutcome::Escaped)
                }
                LockState::LockedBySelf(outcome) => {
                    let waited = self.clock.elapsed().saturating_sub(started);
                    info!(bucket, key, %outcome, waited_secs = waited.as_secs(), "lock held");
                    return Ok(LockHandle {
                        bucket: bucket.to_string(),
                        key: key.to_string(),
                        outcome,
                        waited,
                        polls,
                    });
                }
            };
        }
    }

    /// Sets the tag back to `False`, whatever the handle's outcome.
    ///
    /// # Errors
    /// Returns the store error if the tag cannot be written.
    pub fn release(&self, handle: &LockHandle) -> StoreResult<()> {
        self.store
            .put_tag(&handle.bucket, &handle.key, LOCK_TAG, UNLOCKED)?;
        info!(bucket = %handle.bucket, key = %handle.key, "lock released");
        Ok(())
    }

    /// Runs `body` under the lock and releases it on every path.
    ///
    /// A body error wins over a release error; the latter is then only
    /// logged.
    ///
    /// # Errors
    /// Returns the acquire error, the body error, or the release error, in
    /// that order of precedence.
    pub fn with_lock<T, E, F>(&self, bucket: &str, key: &str, body: F) -> Result<(T, LockHandle), E>
    where
        E: From<crate::store::StoreError>,
        F: FnOnce(&LockHandle) -> Result<T, E>,
    {
        let handle = self.acquire(bucket, key)?;
        let result = body(&handle);
        let released = self.release(&handle);
        match (result, released) {
            (Ok(value), Ok(())) => Ok((value, handle)),
            (Ok(_), Err(err)) => Err(err.into()),
            (Err(err), Ok(())) => Err(err),
            (Err(err), Err(release_err)) => {
                warn!(bucket, key, error = %release_err, "failed to release lock after error");
                Err(err)
            }
        }
    }
}
