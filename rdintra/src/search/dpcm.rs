use crate::predict::{RefSamples, HOR, VER};

/// Sample-wise DPCM prediction for the pure horizontal and vertical modes:
/// every sample is predicted from its causal neighbour in the original
/// block, with the first column (or row) taken from the references.
/// Returns `None` for every other mode.
pub fn dpcm_prediction(org: &[i32], refs: &RefSamples, mode: u8, size: u32) -> Option<Vec<i32>> {
    let n = size as usize;
    let mut pred = vec![0i32; n * n];
    match mode {
        HOR => {
            for y in 0..n {
                pred[y * n] = refs.left[y + 1];
                for x in 1..n {
                    pred[y * n + x] = org[y * n + x - 1];
                }
            }
        }
        VER => {
            pred[..n].copy_from_slice(&refs.above[1..=n]);
            for y in 1..n {
                for x in 0..n {
                    pred[y * n + x] = org[(y - 1) * n + x];
                }
            }
        }
        _ => return None,
    }
    Some(pred)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::predict::DC;

    #[test]
    fn horizontal_uses_left_neighbour() {
        let org: Vec<i32> = (0..16).collect();
        let refs = RefSamples::flat(4, 50);
        let pred = dpcm_prediction(&org, &refs, HOR, 4).unwrap();
        assert_eq!(&pred[..4], &[50, 0, 1, 2]);
        assert_eq!(&pred[12..], &[50, 12, 13, 14]);
    }

    #[test]
    fn vertical_uses_row_above() {
        let org: Vec<i32> = (0..16).collect();
        let mut refs = RefSamples::flat(4, 0);
        refs.above[1..=4].copy_from_slice(&[9, 8, 7, 6]);
        let pred = dpcm_prediction(&org, &refs, VER, 4).unwrap();
        assert_eq!(&pred[..4], &[9, 8, 7, 6]);
        assert_eq!(&pred[4..8], &org[..4]);
    }

    #[test]
    fn other_modes_are_not_dpcm() {
        assert!(dpcm_prediction(&[0; 16], &RefSamples::flat(4, 0), DC, 4).is_none());
    }
}
