// Job / Result Wire Model

use serde::{Deserialize, Serialize};

/// Job ID (1..=job_count, assigned by the producer)
pub type JobId = u64;

/// One chunk of the loan population, pushed to the jobs queue.
///
/// Wire form: `{"id": 1, "load": 10}`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    /// Number of loans to simulate
    pub load: u64,
}

impl Job {
    pub fn new(id: JobId, load: u64) -> Self {
        Self { id, load }
    }

    /// Encode as the single opaque payload stored in the queue
    pub fn encode(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn decode(payload: &str) -> serde_json::Result<Self> {
        serde_json::from_str(payload)
    }
}

/// Partial default count for one job, pushed to the results queue.
///
/// Wire form: `{"id": 1, "defaults": 0}`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobResult {
    /// Echoes the originating job's id
    pub id: JobId,
    pub defaults: u64,
}

impl JobResult {
    pub fn new(id: JobId, defaults: u64) -> Self {
        Self { id, defaults }
    }

    pub fn encode(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn decode(payload: &str) -> serde_json::Result<Self> {
        serde_json::from_str(payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_wire_format() {
        let job = Job::new(3, 1_000);
        assert_eq!(job.encode().unwrap(), r#"{"id":3,"load":1000}"#);
    }

    #[test]
    fn test_result_wire_format() {
        let result = JobResult::new(7, 42);
        assert_eq!(result.encode().unwrap(), r#"{"id":7,"defaults":42}"#);
    }

    #[test]
    fn test_decode_ignores_field_order() {
        let job = Job::decode(r#"{"load": 25, "id": 2}"#).unwrap();
        assert_eq!(job, Job::new(2, 25));
    }

    #[test]
    fn test_decode_rejects_malformed_payloads() {
        assert!(Job::decode("not json").is_err());
        assert!(Job::decode(r#"{"id": 1}"#).is_err());
        assert!(Job::decode(r#"{"id": -1, "load": 5}"#).is_err());
        assert!(JobResult::decode(r#"{"id": 1, "defaults": "many"}"#).is_err());
    }
}
