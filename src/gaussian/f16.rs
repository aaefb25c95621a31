use half::f16;


pub fn pack_f32s_to_u32(upper: f32, lower: f32) -> u32 {
    pack_f16s_to_u32(
        f16::from_f32(upper),
        f16::from_f32(lower),
    )
}

pub fn pack_f16s_to_u32(upper: f16, lower: f16) -> u32 {
    let upper_bits = (upper.to_bits() as u32) << 16;
    let lower_bits = lower.to_bits() as u32;
    upper_bits | lower_bits
}

pub fn unpack_u32_to_f16s(value: u32) -> (f16, f16) {
    let upper = f16::from_bits((value >> 16) as u16);
    let lower = f16::from_bits((value & 0xFFFF) as u16);
    (upper, lower)
}

pub fn unpack_u32_to_f32s(value: u32) -> (f32, f32) {
    let (upper, lower) = unpack_u32_to_f16s(value);
    (upper.to_f32(), lower.to_f32())
}


/// packs halves two per word, even index in the low bits (matches wgsl `unpack2x16float`)
pub fn pack_halves_to_words(halves: &[f16]) -> Vec<u32> {
    halves
        .chunks(2)
        .map(|pair| {
            let lower = pair[0];
            let upper = pair.get(1).copied().unwrap_or(f16::ZERO);
            pack_f16s_to_u32(upper, lower)
        })
        .collect()
}

pub fn unpack_words_to_halves(words: &[u32]) -> Vec<f16> {
    words
        .iter()
        .flat_map(|&word| {
            let (upper, lower) = unpack_u32_to_f16s(word);
            [lower, upper]
        })
        .collect()
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pack_unpack_pair() {
        let packed = pack_f32s_to_u32(1.5, -2.0);
        let (upper, lower) = unpack_u32_to_f32s(packed);

        assert_eq!(upper, 1.5);
        assert_eq!(lower, -2.0);
    }

    #[test]
    fn test_even_half_is_low() {
        let words = pack_halves_to_words(&[f16::ONE, f16::ZERO]);
        assert_eq!(words, vec![f16::ONE.to_bits() as u32]);
    }

    #[test]
    fn test_odd_length_pads_zero() {
        let halves = [f16::from_f32(3.0), f16::from_f32(4.0), f16::from_f32(5.0)];
        let words = pack_halves_to_words(&halves);
        assert_eq!(words.len(), 2);

        let unpacked = unpack_words_to_halves(&words);
        assert_eq!(&unpacked[..3], &halves);
        assert_eq!(unpacked[3], f16::ZERO);
    }
}
