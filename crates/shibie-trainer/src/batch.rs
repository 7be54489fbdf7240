//! Padded tensor batches built from encoded examples.

use candle_core::{Device, Result, Tensor};
use shibie_core::EncodedExample;

/// One batch of fixed-length rows on a device.
pub struct Batch {
    /// [batch, seq] u32
    pub input_ids: Tensor,
    /// [batch, seq] u32, all zero (single segment)
    pub token_type_ids: Tensor,
    /// [batch, seq] u32
    pub attention_mask: Tensor,
    /// [batch, seq] u32 tag indices
    pub labels: Tensor,
    /// Flat `row * seq + col` indices of the attended positions.
    pub active: Tensor,
}

impl Batch {
    /// Stack examples into a batch. All rows must share one length.
    pub fn from_examples(examples: &[&EncodedExample], device: &Device) -> Result<Self> {
        let rows = examples.len();
        let seq = examples.first().map_or(0, |e| e.input_ids.len());
        if let Some(bad) = examples.iter().find(|e| e.input_ids.len() != seq) {
            candle_core::bail!(
                "batch rows must share one length: expected {seq}, got {}",
                bad.input_ids.len()
            );
        }

        let mut input_ids = Vec::with_capacity(rows * seq);
        let mut attention_mask = Vec::with_capacity(rows * seq);
        let mut labels = Vec::with_capacity(rows * seq);
        let mut active = Vec::new();

        for (row, example) in examples.iter().enumerate() {
            input_ids.extend_from_slice(&example.input_ids);
            attention_mask.extend_from_slice(&example.attention_mask);
            labels.extend_from_slice(&example.labels);
            active.extend(
                example
                    .attention_mask
                    .iter()
                    .enumerate()
                    .filter(|(_, m)| **m == 1)
                    .map(|(col, _)| (row * seq + col) as u32),
            );
        }

        let n_active = active.len();
        Ok(Self {
            input_ids: Tensor::from_vec(input_ids, (rows, seq), device)?,
            token_type_ids: Tensor::zeros((rows, seq), candle_core::DType::U32, device)?,
            attention_mask: Tensor::from_vec(attention_mask, (rows, seq), device)?,
            labels: Tensor::from_vec(labels, (rows, seq), device)?,
            active: Tensor::from_vec(active, n_active, device)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(ids: &[u32], mask: &[u32]) -> EncodedExample {
        EncodedExample {
            tokens: vec!["x".to_string(); mask.iter().filter(|m| **m == 1).count() - 2],
            input_ids: ids.to_vec(),
            labels: vec![0; ids.len()],
            attention_mask: mask.to_vec(),
        }
    }

    #[test]
    fn test_batch_shapes_and_active() {
        let a = row(&[2, 5, 6, 3], &[1, 1, 1, 1]);
        let b = row(&[2, 7, 3, 0], &[1, 1, 1, 0]);
        let batch = Batch::from_examples(&[&a, &b], &Device::Cpu).unwrap();

        assert_eq!(batch.input_ids.dims(), &[2, 4]);
        assert_eq!(batch.token_type_ids.dims(), &[2, 4]);
        assert_eq!(
            batch.active.to_vec1::<u32>().unwrap(),
            vec![0, 1, 2, 3, 4, 5, 6]
        );
    }

    #[test]
    fn test_batch_rejects_ragged_rows() {
        let a = row(&[2, 5, 3], &[1, 1, 1]);
        let b = row(&[2, 7, 6, 3], &[1, 1, 1, 1]);
        assert!(Batch::from_examples(&[&a, &b], &Device::Cpu).is_err());
    }
}
