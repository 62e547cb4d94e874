//! Deterministic shard routing on a record's source number.

/// Map a routing key to a shard index in `[0, shard_count)`.
///
/// md5 digest taken as a big-endian 128-bit integer, modulo the shard
/// count. The interpretation must stay identical across producer and
/// consumer builds: a message published for shard `k` is exactly the one
/// consumed from queue `k`, and replays with the same shard count route
/// identically.
pub fn shard_for(routing_key: &str, shard_count: u32) -> u32 {
    debug_assert!(shard_count > 0, "shard_count must be non-zero");
    let digest = md5::compute(routing_key.as_bytes());
    (u128::from_be_bytes(digest.0) % u128::from(shard_count)) as u32
}

/// Queue name for one shard: `{prefix}_{shard}`.
pub fn queue_name(prefix: &str, shard: u32) -> String {
    format!("{}_{}", prefix, shard)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shard_in_range_and_deterministic() {
        for shard_count in [1, 2, 4, 7, 16] {
            for n in 0..100u32 {
                let key = format!("0912{:07}", n);
                let shard = shard_for(&key, shard_count);
                assert!(shard < shard_count);
                assert_eq!(shard, shard_for(&key, shard_count));
            }
        }
    }

    #[test]
    fn test_distribution_uses_every_shard() {
        let shard_count = 4;
        let mut hit = [false; 4];
        for n in 0..200u32 {
            hit[shard_for(&format!("0912{:07}", n), shard_count) as usize] = true;
        }
        assert!(hit.iter().all(|h| *h), "200 keys should cover all 4 shards");
    }

    #[test]
    fn test_single_shard_always_zero() {
        assert_eq!(shard_for("09121234567", 1), 0);
        assert_eq!(shard_for("09999999999", 1), 0);
    }

    #[test]
    fn test_queue_name_format() {
        assert_eq!(queue_name("cdr_queue", 0), "cdr_queue_0");
        assert_eq!(queue_name("cdr_queue", 13), "cdr_queue_13");
    }
}
