use super::register::ByteOrder;

/// Reassembles register words into big endian bytes of the numeric value.
pub(crate) fn decode_numeric_bytes(data: &[u16], order: ByteOrder) -> Vec<u8> {
  match order {
    ByteOrder::Big => data.iter().flat_map(|word| word.to_be_bytes()).collect(),
    ByteOrder::Little => {
      data.iter().rev().flat_map(|word| word.to_le_bytes()).collect()
    }
    ByteOrder::BigSwap => {
      data.iter().flat_map(|word| word.to_le_bytes()).collect()
    }
    ByteOrder::LittleSwap => {
      data.iter().rev().flat_map(|word| word.to_be_bytes()).collect()
    }
  }
}

/// Characters keep their wire order; only the bytes inside a word may swap.
pub(crate) fn decode_string_bytes(data: &[u16], order: ByteOrder) -> Vec<u8> {
  let swapped = matches!(order, ByteOrder::Little | ByteOrder::BigSwap);

  let mut bytes = data
    .iter()
    .flat_map(|word| {
      if swapped {
        word.to_le_bytes()
      } else {
        word.to_be_bytes()
      }
    })
    .collect::<Vec<_>>();

  while bytes.last() == Some(&0) {
    bytes.pop();
  }

  bytes
}

#[cfg(test)]
mod tests {
  use super::*;

  const WORDS: [u16; 2] = [0x1234, 0x5678];

  #[test]
  fn big_keeps_wire_order() {
    assert_eq!(
      decode_numeric_bytes(&WORDS, ByteOrder::Big),
      vec![0x12, 0x34, 0x56, 0x78]
    );
  }

  #[test]
  fn little_reverses_words_and_bytes() {
    assert_eq!(
      decode_numeric_bytes(&WORDS, ByteOrder::Little),
      vec![0x78, 0x56, 0x34, 0x12]
    );
  }

  #[test]
  fn big_swap_swaps_bytes_inside_words() {
    assert_eq!(
      decode_numeric_bytes(&WORDS, ByteOrder::BigSwap),
      vec![0x34, 0x12, 0x78, 0x56]
    );
  }

  #[test]
  fn little_swap_reverses_words_only() {
    assert_eq!(
      decode_numeric_bytes(&WORDS, ByteOrder::LittleSwap),
      vec![0x56, 0x78, 0x12, 0x34]
    );
  }

  #[test]
  fn strings_trim_padding() {
    let words = [0x4142, 0x4300];
    assert_eq!(decode_string_bytes(&words, ByteOrder::Big), b"ABC".to_vec());

    let words = [0x4241, 0x0043];
    assert_eq!(
      decode_string_bytes(&words, ByteOrder::BigSwap),
      b"ABC".to_vec()
    );
  }
}
