use std::str::FromStr;

/// Maximum width of a JobId, which is the full hex rendering of a UUID.
pub const MAX_JOB_ID_WIDTH: usize = 32;
/// Minimum width accepted by a JobIdGenerator.
pub const MIN_JOB_ID_WIDTH: usize = 8;
/// Default width of generated JobIds. Eight hex characters is only 32 bits
/// of token space: see `JobIdGenerator::collision_bound`.
pub const DEFAULT_JOB_ID_WIDTH: usize = 8;

/// JobId is the opaque, lowercase-hex token identifying a single submission.
/// Every table name of the job is derived from it.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct JobId(String);

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum JobIdError {
    #[error("job id must be between 1 and {MAX_JOB_ID_WIDTH} characters (got {0})")]
    Length(usize),
    #[error("job id must contain only lowercase hex characters (got {0:?})")]
    Character(String),
    #[error("job id width must be between {MIN_JOB_ID_WIDTH} and {MAX_JOB_ID_WIDTH} (got {0})")]
    Width(usize),
}

impl JobId {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Width of this id, in hex characters.
    pub fn width(&self) -> usize {
        self.0.len()
    }
}

impl FromStr for JobId {
    type Err = JobIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() || s.len() > MAX_JOB_ID_WIDTH {
            return Err(JobIdError::Length(s.len()));
        }
        if !s.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f')) {
            return Err(JobIdError::Character(s.to_string()));
        }
        Ok(Self(s.to_string()))
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::fmt::Debug for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        <Self as std::fmt::Display>::fmt(self, f)
    }
}

impl serde::Serialize for JobId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        self.0.serialize(serializer)
    }
}

impl<'de> serde::Deserialize<'de> for JobId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        use serde::de::Error;
        let str_val = std::borrow::Cow::<'de, str>::deserialize(deserializer)?;
        JobId::from_str(str_val.as_ref())
            .map_err(|err| D::Error::custom(format!("invalid job id: {err}")))
    }
}

/// Generates JobIds by truncating the hex rendering of a random (v4) UUID.
///
/// The UUID carries 122 random bits, but only the leading `width` hex
/// characters survive truncation, so the token space is 16^width. At the
/// default width of 8 that is 2^32, and the probability of any collision
/// among n ids is bounded by n^2 / 2^33 rather than anything near 2^-128.
#[derive(Debug, Clone, Copy)]
pub struct JobIdGenerator {
    width: usize,
}

impl Default for JobIdGenerator {
    fn default() -> Self {
        Self {
            width: DEFAULT_JOB_ID_WIDTH,
        }
    }
}

impl JobIdGenerator {
    /// Return a generator of ids having `width` hex characters.
    pub fn new(width: usize) -> Result<Self, JobIdError> {
        if !(MIN_JOB_ID_WIDTH..=MAX_JOB_ID_WIDTH).contains(&width) {
            return Err(JobIdError::Width(width));
        }
        Ok(Self { width })
    }

    pub fn width(&self) -> usize {
        self.width
    }

    /// Generate and return a fresh id.
    pub fn next(&self) -> JobId {
        let mut hex = uuid::Uuid::new_v4().simple().to_string();
        hex.truncate(self.width);
        JobId(hex)
    }

    /// Upper bound on the probability that any two of `n` generated ids collide.
    ///
    /// The first four bits of the thirteenth hex character of a v4 UUID are
    /// fixed to the version nibble, so widths beyond 12 lose four bits (and
    /// beyond 16, two more variant bits). The bound accounts for both.
    pub fn collision_bound(&self, n: u64) -> f64 {
        let mut bits = 4 * self.width as i32;
        if self.width > 12 {
            bits -= 4;
        }
        if self.width > 16 {
            bits -= 2;
        }
        let pairs = (n as f64) * (n.saturating_sub(1) as f64) / 2.0;
        (pairs / 2f64.powi(bits)).min(1.0)
    }
}
