//! Conditioning weight calibration
//!
//! The default alpha brings the condition embeddings to the same average
//! magnitude as the image embeddings before they are concatenated.

use crate::embedding::RawEmbeddings;
use crate::{Error, Result};

/// `mean ||image_i|| / mean ||condition_i||` over the reference embeddings
pub fn default_alpha(image: &RawEmbeddings, condition: &RawEmbeddings) -> Result<f64> {
    let image_norm = image.mean_norm()?;
    let condition_norm = condition.mean_norm()?;
    if condition_norm == 0.0 {
        return Err(Error::ZeroNorm);
    }
    Ok(image_norm / condition_norm)
}

/// Reject alphas that cannot weight an embedding
pub fn validate_alpha(alpha: f64) -> Result<f64> {
    if alpha.is_finite() && alpha >= 0.0 {
        Ok(alpha)
    } else {
        Err(Error::InvalidAlpha(alpha))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_norm_ratio() {
        let image = RawEmbeddings::from_rows(2, vec![vec![3.0, 4.0], vec![6.0, 8.0]]).unwrap();
        let condition = RawEmbeddings::from_rows(3, vec![vec![1.0, 0.0, 0.0], vec![0.0, 1.0, 0.0]]).unwrap();
        assert!((default_alpha(&image, &condition).unwrap() - 7.5).abs() < 1e-12);
    }

    #[test]
    fn test_zero_condition() {
        let image = RawEmbeddings::from_rows(1, vec![vec![1.0]]).unwrap();
        let condition = RawEmbeddings::from_rows(2, vec![vec![0.0, 0.0]]).unwrap();
        assert!(matches!(default_alpha(&image, &condition), Err(Error::ZeroNorm)));
    }

    #[test]
    fn test_validate_alpha() {
        assert_eq!(validate_alpha(0.0).unwrap(), 0.0);
        assert!(validate_alpha(-1.0).is_err());
        assert!(validate_alpha(f64::NAN).is_err());
        assert!(validate_alpha(f64::INFINITY).is_err());
    }
}
