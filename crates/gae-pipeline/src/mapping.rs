use gae_types::{JobHandle, JobId};

/// Associates each completed algorithm job with the attribute its results are
/// stored under. Order is preserved; the engine pairs `job_ids[i]` with
/// `attribute_names[i]`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResultMapping {
    entries: Vec<(JobId, String)>,
}

impl ResultMapping {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, job: &JobHandle, attribute: impl Into<String>) {
        self.entries.push((job.id, attribute.into()));
    }

    pub fn job_ids(&self) -> Vec<u64> {
        self.entries.iter().map(|(id, _)| id.0).collect()
    }

    pub fn attribute_names(&self) -> Vec<&str> {
        self.entries.iter().map(|(_, attr)| attr.as_str()).collect()
    }
}
