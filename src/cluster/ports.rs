// src/cluster/ports.rs
use std::collections::BTreeSet;
use anyhow::{anyhow, Result};

/// 端口集合：离散端口加上互不重叠的有序闭区间
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PortSet {
    singles: BTreeSet<u16>,
    ranges: Vec<(u16, u16)>,
}

impl PortSet {
    /// 解析端口表达式，如 "22,80,1000-2000,443"
    pub fn parse(expr: &str) -> Result<PortSet> {
        let mut set = PortSet::default();

        for part in expr.split(',') {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }

            if let Some((start, end)) = part.split_once('-') {
                let start: u16 = start
                    .trim()
                    .parse()
                    .map_err(|_| anyhow!("Invalid port range start: {}", part))?;
                let end: u16 = end
                    .trim()
                    .parse()
                    .map_err(|_| anyhow!("Invalid port range end: {}", part))?;
                if start > end {
                    return Err(anyhow!("Port range start greater than end: {}", part));
                }
                set.ranges.push((start, end));
            } else {
                let port: u16 = part
                    .parse()
                    .map_err(|_| anyhow!("Invalid port: {}", part))?;
                set.singles.insert(port);
            }
        }

        set.normalize();
        Ok(set)
    }

    /// 合并另一个端口集合
    pub fn merge(&mut self, other: &PortSet) {
        self.singles.extend(other.singles.iter().copied());
        self.ranges.extend(other.ranges.iter().copied());
        self.normalize();
    }

    // 区间排序合并，吸收被区间覆盖的离散端口
    fn normalize(&mut self) {
        if !self.ranges.is_empty() {
            self.ranges.sort_unstable();
            let mut merged: Vec<(u16, u16)> = Vec::with_capacity(self.ranges.len());
            for &(start, end) in &self.ranges {
                match merged.last_mut() {
                    Some(last) if u32::from(start) <= u32::from(last.1) + 1 => {
                        if end > last.1 {
                            last.1 = end;
                        }
                    }
                    _ => merged.push((start, end)),
                }
            }
            self.ranges = merged;
        }

        let ranges = &self.ranges;
        self.singles
            .retain(|&p| !ranges.iter().any(|&(s, e)| p >= s && p <= e));
    }

    pub fn contains(&self, port: u16) -> bool {
        if self.singles.contains(&port) {
            return true;
        }
        self.ranges
            .binary_search_by(|&(start, end)| {
                if port < start {
                    std::cmp::Ordering::Greater
                } else if port > end {
                    std::cmp::Ordering::Less
                } else {
                    std::cmp::Ordering::Equal
                }
            })
            .is_ok()
    }

    /// 空集合表示通配端口
    pub fn is_empty(&self) -> bool {
        self.singles.is_empty() && self.ranges.is_empty()
    }

    /// 枚举所有端口，升序去重；超过max_range_size的区间只取头部
    pub fn enumerate(&self, max_range_size: usize) -> Vec<u16> {
        let mut ports: BTreeSet<u16> = self.singles.clone();

        for &(start, end) in &self.ranges {
            let size = usize::from(end - start) + 1;
            let take = size.min(max_range_size);
            for offset in 0..take {
                ports.insert(start + offset as u16);
            }
        }

        ports.into_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_mixed_expression() {
        let set = PortSet::parse("22,80,1000-1003,443").unwrap();
        assert_eq!(set.enumerate(usize::MAX), vec![22, 80, 443, 1000, 1001, 1002, 1003]);
        assert!(set.contains(1002));
        assert!(!set.contains(999));
    }

    #[test]
    fn test_membership_matches_enumeration() {
        let set = PortSet::parse("21,100-110,443,105-120").unwrap();
        let all = set.enumerate(usize::MAX);
        for port in 0u16..200 {
            assert_eq!(set.contains(port), all.contains(&port), "port {}", port);
        }
        assert_eq!(set.contains(443), all.contains(&443));
    }

    #[test]
    fn test_overlapping_ranges_merge() {
        let set = PortSet::parse("1000-1005,1003-1010,1006").unwrap();
        assert_eq!(
            set.enumerate(usize::MAX),
            (1000u16..=1010).collect::<Vec<_>>()
        );
    }

    #[test]
    fn test_enumerate_truncates_large_ranges() {
        let set = PortSet::parse("8000-9000").unwrap();
        let ports = set.enumerate(5);
        assert_eq!(ports, vec![8000, 8001, 8002, 8003, 8004]);
        // 截断只影响枚举，不影响成员判定
        assert!(set.contains(8999));
    }

    #[test]
    fn test_empty_expression_is_wildcard() {
        let set = PortSet::parse("").unwrap();
        assert!(set.is_empty());
        assert!(set.enumerate(10).is_empty());
    }

    #[test]
    fn test_invalid_expression_errors() {
        assert!(PortSet::parse("abc").is_err());
        assert!(PortSet::parse("100-50").is_err());
        assert!(PortSet::parse("99999").is_err());
    }

    #[test]
    fn test_upper_boundary_range() {
        let set = PortSet::parse("65530-65535").unwrap();
        assert!(set.contains(65535));
        assert_eq!(
            set.enumerate(usize::MAX),
            vec![65530, 65531, 65532, 65533, 65534, 65535]
        );
    }

    #[test]
    fn test_merge_absorbs_singles() {
        let mut a = PortSet::parse("80,443").unwrap();
        let b = PortSet::parse("80-90").unwrap();
        a.merge(&b);
        assert!(a.contains(85));
        assert_eq!(a.enumerate(usize::MAX).first(), Some(&80));
        assert_eq!(a.enumerate(usize::MAX).last(), Some(&443));
    }
}
