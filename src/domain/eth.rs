/// Well-formed Ethereum address: `0x` followed by 40 hex digits.
/// Mixed-case checksums are accepted but not verified.
pub fn is_valid_eth_address(address: &str) -> bool {
    let Some(hex) = address
        .strip_prefix("0x")
        .or_else(|| address.strip_prefix("0X"))
    else {
        return false;
    };
    hex.len() == 40 && hex.bytes().all(|b| b.is_ascii_hexdigit())
}
