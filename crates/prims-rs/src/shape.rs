//! Shape and stride arithmetic shared by the metadata functions.

use crate::error::{PrimError, PrimResult};

/// Returns the row-major strides of a densely packed tensor with the given
/// shape. Rank-zero tensors have no strides.
pub fn contiguous_strides_for(shape: &[usize]) -> Vec<usize> {
    let mut strides = vec![1; shape.len()];
    let mut acc = 1usize;
    for (stride, &length) in strides.iter_mut().zip(shape.iter()).rev() {
        *stride = acc;
        acc = acc.saturating_mul(length.max(1));
    }
    strides
}

/// Validates that `idx` can index a dimension of a rank-`rank` tensor.
pub fn validate_idx(rank: usize, idx: usize) -> PrimResult<()> {
    if idx < rank {
        Ok(())
    } else {
        Err(PrimError::IndexOutOfRange { index: idx, rank })
    }
}

/// Validates that `idx` is a valid exclusive upper bound for a rank-`rank`
/// tensor, i.e. `0 < idx <= rank`.
pub fn validate_exclusive_idx(rank: usize, idx: usize) -> PrimResult<()> {
    if idx > 0 && idx <= rank {
        Ok(())
    } else {
        Err(PrimError::IndexOutOfRange { index: idx, rank })
    }
}

/// Validates a dimension length supplied by a frontend, where lengths travel
/// as signed integers.
pub fn validate_dim_length(length: i64) -> PrimResult<usize> {
    usize::try_from(length)
        .map_err(|_| PrimError::shape(format!("dimension length {length} is negative")))
}

/// Validates a frontend-supplied shape: every length non-negative and the
/// total element count representable.
pub fn validate_shape(shape: &[i64]) -> PrimResult<Vec<usize>> {
    let validated = shape
        .iter()
        .map(|&length| validate_dim_length(length))
        .collect::<PrimResult<Vec<usize>>>()?;
    let mut numel = 1usize;
    for &length in &validated {
        numel = numel
            .checked_mul(length)
            .ok_or_else(|| PrimError::shape(format!("shape {shape:?} overflows element count")))?;
    }
    Ok(validated)
}

/// Computes the shape produced by reducing `shape` over `dims`: reduced
/// dimensions are removed, the remainder keeps its order. Fails on an
/// out-of-range or repeated dimension.
pub fn reduction_output_shape(shape: &[usize], dims: &[usize]) -> PrimResult<Vec<usize>> {
    let mut seen = vec![false; shape.len()];
    for &dim in dims {
        validate_idx(shape.len(), dim)?;
        if seen[dim] {
            return Err(PrimError::shape(format!(
                "dimension {dim} appears more than once in reduction dims {dims:?}"
            )));
        }
        seen[dim] = true;
    }
    Ok(shape
        .iter()
        .zip(seen.iter())
        .filter(|(_, reduced)| !**reduced)
        .map(|(&length, _)| length)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contiguous_strides_are_row_major() {
        assert_eq!(contiguous_strides_for(&[2, 3, 4]), vec![12, 4, 1]);
        assert_eq!(contiguous_strides_for(&[5]), vec![1]);
        assert_eq!(contiguous_strides_for(&[]), Vec::<usize>::new());
    }

    #[test]
    fn contiguous_strides_skip_zero_length_dims() {
        // A zero-length dimension contributes factor 1, matching dense layouts.
        assert_eq!(contiguous_strides_for(&[2, 0, 3]), vec![3, 3, 1]);
    }

    #[test]
    fn idx_validation_bounds() {
        assert!(validate_idx(3, 2).is_ok());
        assert!(matches!(
            validate_idx(3, 3),
            Err(PrimError::IndexOutOfRange { index: 3, rank: 3 })
        ));
        assert!(validate_exclusive_idx(3, 3).is_ok());
        assert!(validate_exclusive_idx(3, 0).is_err());
        assert!(validate_exclusive_idx(3, 4).is_err());
    }

    #[test]
    fn dim_length_rejects_negatives() {
        assert_eq!(validate_dim_length(0).unwrap(), 0);
        assert_eq!(validate_dim_length(7).unwrap(), 7);
        assert!(validate_dim_length(-1).is_err());
    }

    #[test]
    fn shape_validation_checks_lengths_and_overflow() {
        assert_eq!(validate_shape(&[2, 3]).unwrap(), vec![2, 3]);
        assert!(validate_shape(&[2, -3]).is_err());
        assert!(validate_shape(&[i64::MAX, 2]).is_err());
    }

    #[test]
    fn reduction_output_shape_cases() {
        assert_eq!(reduction_output_shape(&[2, 3, 4], &[1]).unwrap(), vec![2, 4]);
        assert_eq!(
            reduction_output_shape(&[2, 3, 4], &[0, 1, 2]).unwrap(),
            Vec::<usize>::new()
        );
        assert_eq!(reduction_output_shape(&[2, 3], &[]).unwrap(), vec![2, 3]);
        assert!(reduction_output_shape(&[2, 3], &[2]).is_err());
        assert!(reduction_output_shape(&[2, 3], &[1, 1]).is_err());
    }
}
