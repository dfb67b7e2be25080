use rand::RngCore;

/// 生成 token id：128 位随机数的十六进制表示（32 字符）
/// token id 同时是持有人凭证，因此必须不可猜测
pub fn generate_token_id() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_generate_token_id() {
        let id = generate_token_id();
        assert_eq!(id.len(), 32);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_generate_token_ids_are_unique() {
        let ids: HashSet<String> = (0..1000).map(|_| generate_token_id()).collect();
        assert_eq!(ids.len(), 1000);
    }
}
