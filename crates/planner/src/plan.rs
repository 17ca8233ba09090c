use crate::error::PlanError;
use model::core::chunk::Chunk;

/// Number of chunks needed to cover `total_records`.
pub fn chunk_count(total_records: u64, chunk_size: u64) -> u64 {
    if chunk_size == 0 {
        return 0;
    }
    total_records.div_ceil(chunk_size)
}

/// Splits `[0, total_records)` into contiguous chunks of `chunk_size`.
///
/// The last chunk holds the remainder and may be smaller. An empty source
/// yields an empty plan.
pub fn plan_chunks(total_records: u64, chunk_size: i64) -> Result<Vec<Chunk>, PlanError> {
    if chunk_size <= 0 {
        return Err(PlanError::InvalidConfig(format!(
            "chunk size must be positive, got {chunk_size}"
        )));
    }
    let chunk_size = chunk_size as u64;
    let count = chunk_count(total_records, chunk_size);

    let chunks = (0..count)
        .map(|index| {
            let start_offset = index * chunk_size;
            let size = chunk_size.min(total_records - start_offset);
            Chunk::new(index, start_offset, size)
        })
        .collect();

    Ok(chunks)
}
