use crate::prelude::*;

fn is_column_vector(mask: &Array2<f64>) -> bool {
    mask.ncols() == 1
}

/// Multiplies `target` by `mask` in place.
///
/// A `[minibatch, 1]` mask zeroes whole examples; a mask with the target's
/// shape masks individual outputs.
pub fn apply_mask(target: &mut Array2<f64>, mask: &Array2<f64>) -> Result<()> {
    if is_column_vector(mask) && mask.nrows() == target.nrows() {
        *target *= mask;
    } else if mask.shape() == target.shape() {
        *target *= mask;
    } else {
        return Err(NNError::InvalidMask(format!(
            "mask shape {:?} matches neither [{}, 1] nor target shape {:?}",
            mask.shape(),
            target.nrows(),
            target.shape()
        )));
    }
    Ok(())
}

pub fn is_per_output_masking(target: &Array2<f64>, mask: &Array2<f64>) -> bool {
    !is_column_vector(mask) || mask.shape() == target.shape()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn column_mask_zeroes_examples() {
        let mut x = array![[1.0, 2.0], [3.0, 4.0], [5.0, 6.0]];
        apply_mask(&mut x, &array![[1.0], [0.0], [1.0]]).unwrap();
        assert_eq!(x, array![[1.0, 2.0], [0.0, 0.0], [5.0, 6.0]]);
    }

    #[test]
    fn full_mask_is_elementwise() {
        let mut x = array![[1.0, 2.0], [3.0, 4.0]];
        apply_mask(&mut x, &array![[0.0, 1.0], [1.0, 0.0]]).unwrap();
        assert_eq!(x, array![[0.0, 2.0], [3.0, 0.0]]);
    }

    #[test]
    fn bad_mask_shape_is_an_error() {
        let mut x = Array2::<f64>::ones((2, 3));
        assert!(matches!(
            apply_mask(&mut x, &Array2::ones((3, 1))),
            Err(NNError::InvalidMask(_))
        ));
        assert!(apply_mask(&mut x, &Array2::ones((2, 2))).is_err());
    }

    #[test]
    fn per_output_detection() {
        let x = Array2::<f64>::ones((4, 3));
        assert!(!is_per_output_masking(&x, &Array2::ones((4, 1))));
        assert!(is_per_output_masking(&x, &Array2::ones((4, 3))));

        // single output: a column mask is both per-example and per-output
        let y = Array2::<f64>::ones((4, 1));
        assert!(is_per_output_masking(&y, &Array2::ones((4, 1))));
    }
}
