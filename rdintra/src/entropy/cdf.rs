//! Adaptive probability primitives.
//!
//! CDFs are stored inverted (`32768 - cumulative`) with the adaptation
//! counter in the last slot, and adapt exactly like an arithmetic coder's
//! models would. Instead of producing bits, every coding call returns the
//! ideal code length `-log2(p)` in fractional-bit units.

use crate::cost::FRAC_BITS_SCALE;

pub const PROB_TOP: u32 = 32768;

/// Cost of one equiprobable bin.
pub const BYPASS_BITS: u64 = FRAC_BITS_SCALE;

/// Binary model: `[P(true) * 32768, adaptation count]`.
pub type BoolCdf = [u16; 2];

pub const BOOL_INIT: BoolCdf = [16384, 0];

/// Uniform inverted CDF for an alphabet of `N - 1` symbols plus counter.
pub fn uniform_cdf<const N: usize>() -> [u16; N] {
    let symbols = (N - 1) as u32;
    let mut cdf = [0u16; N];
    for (i, v) in cdf.iter_mut().take(N - 1).enumerate() {
        *v = (PROB_TOP - PROB_TOP * (i as u32 + 1) / (symbols + 1)) as u16;
    }
    cdf
}

/// Code length of a symbol with probability `p / 32768`.
#[inline]
pub fn prob_cost(p: u32) -> u64 {
    let p = p.clamp(1, PROB_TOP - 1) as f64 / PROB_TOP as f64;
    (-p.log2() * FRAC_BITS_SCALE as f64).round() as u64
}

pub fn update_cdf(cdf: &mut [u16], symbol: u32, n_symbols: u32) {
    let count = cdf[n_symbols as usize];
    let rate = 4 + (count >> 4) + if n_symbols > 2 { 1 } else { 0 };
    for i in 0..n_symbols {
        if i < symbol {
            cdf[i as usize] += (32768 - cdf[i as usize]) >> rate;
        } else {
            cdf[i as usize] -= cdf[i as usize] >> rate;
        }
    }
    cdf[n_symbols as usize] = count + if count < 32 { 1 } else { 0 };
}

/// Costs `symbol` out of `n_symbols + 1` and adapts the model.
pub fn code_symbol(symbol: u32, cdf: &mut [u16], n_symbols: u32) -> u64 {
    let ns = n_symbols as usize;
    let s = symbol as usize;
    let fl = if s > 0 { cdf[s - 1] as u32 } else { PROB_TOP };
    let fh = if s < ns { cdf[s] as u32 } else { 0 };
    let bits = prob_cost(fl - fh);
    update_cdf(cdf, symbol, n_symbols);
    bits
}

/// Costs a binary decision and adapts the model.
pub fn code_bool(val: bool, cdf: &mut BoolCdf) -> u64 {
    let f = cdf[0] as u32;
    let bits = prob_cost(if val { f } else { PROB_TOP - f });

    let count = cdf[1];
    let rate = 4 + (count >> 4);
    if val {
        cdf[0] += (32768 - cdf[0]) >> rate;
    } else {
        cdf[0] -= cdf[0] >> rate;
    }
    cdf[1] = count + if count < 32 { 1 } else { 0 };
    bits
}

/// Costs a binary decision under a fixed probability of `true`.
#[inline]
pub fn code_bool_prob(val: bool, prob: u16) -> u64 {
    let p = prob as u32;
    prob_cost(if val { p } else { PROB_TOP - p })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn even_odds_cost_one_bit() {
        assert_eq!(prob_cost(16384), FRAC_BITS_SCALE);
        let mut cdf = BOOL_INIT;
        assert_eq!(code_bool(true, &mut cdf), FRAC_BITS_SCALE);
    }

    #[test]
    fn bool_update_tracks_observed_value() {
        let mut cdf = BOOL_INIT;
        code_bool(true, &mut cdf);
        assert!(cdf[0] > 16384);
        assert_eq!(cdf[1], 1);

        let mut cdf = BOOL_INIT;
        code_bool(false, &mut cdf);
        assert!(cdf[0] < 16384);
    }

    #[test]
    fn repeated_symbol_gets_cheaper() {
        let mut cdf = BOOL_INIT;
        let first = code_bool(false, &mut cdf);
        let mut last = first;
        for _ in 0..20 {
            last = code_bool(false, &mut cdf);
        }
        assert!(last < first);
    }

    #[test]
    fn cdf_update_counter_increments() {
        let mut cdf = [16384u16, 8192, 0];
        update_cdf(&mut cdf, 0, 2);
        assert_eq!(cdf[2], 1);
        assert!(cdf[0] < 16384);
    }

    #[test]
    fn uniform_cdf_splits_evenly() {
        let cdf: [u16; 5] = uniform_cdf();
        assert_eq!(cdf, [26215, 19661, 13108, 6554, 0]);
        let mut c = cdf;
        let bits = code_symbol(4, &mut c, 4);
        let expected = (-(0.2f64).log2() * FRAC_BITS_SCALE as f64).round() as u64;
        assert!(bits.abs_diff(expected) < 8);
    }

    #[test]
    fn unlikely_terminating_bin_is_expensive() {
        assert_eq!(code_bool_prob(true, 128), 8 * FRAC_BITS_SCALE);
        assert!(code_bool_prob(false, 128) < FRAC_BITS_SCALE / 64);
    }
}
