//! Partitioning of source ids into membership-limited chunks

use crate::backend::Cursor;
use crate::error::{AppError, Result};
use std::collections::HashSet;
use uuid::Uuid;

/// One partition of the followed-id set and its paging progress
#[derive(Debug, Clone, PartialEq)]
pub struct UserChunk {
    pub chunk_index: usize,
    pub member_ids: Vec<Uuid>,
    /// Resume point for the next query; `None` before the first fetch
    pub cursor: Option<Cursor>,
    /// Items this chunk contributed to the buffer
    pub fetched_count: usize,
    /// Of those, how many have been handed to the caller
    pub returned_count: usize,
    /// The backend returned a short page, nothing more upstream
    pub is_exhausted: bool,
}

impl UserChunk {
    fn new(chunk_index: usize, member_ids: Vec<Uuid>) -> Self {
        Self {
            chunk_index,
            member_ids,
            cursor: None,
            fetched_count: 0,
            returned_count: 0,
            is_exhausted: false,
        }
    }

    /// Everything fetched has been returned but upstream may have more
    pub fn needs_fetch(&self) -> bool {
        !self.is_exhausted && self.returned_count == self.fetched_count
    }

    /// Nothing left upstream or in the buffer
    pub fn is_done(&self) -> bool {
        self.is_exhausted && self.returned_count == self.fetched_count
    }
}

pub struct ChunkManager;

impl ChunkManager {
    /// Split `ids` into ordered chunks of at most `chunk_size` members.
    /// Duplicate ids are dropped, keeping the first occurrence.
    pub fn partition(ids: &[Uuid], chunk_size: usize) -> Result<Vec<UserChunk>> {
        if chunk_size == 0 {
            return Err(AppError::Config("chunk size must be at least 1".into()));
        }

        let mut seen = HashSet::with_capacity(ids.len());
        let unique: Vec<Uuid> = ids.iter().copied().filter(|id| seen.insert(*id)).collect();

        Ok(unique
            .chunks(chunk_size)
            .enumerate()
            .map(|(idx, members)| UserChunk::new(idx, members.to_vec()))
            .collect())
    }
}
