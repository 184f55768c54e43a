// Copyright The spool project developers.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// This file may not be copied, modified, or distributed except according to those terms.

//! Subscription matching for SUB sockets: a path-compressed radix trie of
//! subscribed prefixes with per-node reference counts, so subscribing twice
//! requires unsubscribing twice. A message matches when any subscribed
//! prefix is a prefix of its body; the empty prefix matches everything.

/// Number of leading bytes two slices agree on.
fn common_prefix(a: &[u8], b: &[u8]) -> usize {
    a.iter().zip(b.iter()).take_while(|(x, y)| x == y).count()
}

struct Node {
    count: u32,
    children: Vec<(Vec<u8>, Node)>
}

impl Node {
    fn new(count: u32) -> Node {
        Node {
            count,
            children: Vec::new()
        }
    }

    fn subscribe(&mut self, key: &[u8]) {
        if key.is_empty() {
            self.count += 1;
            return;
        }

        for (label, child) in self.children.iter_mut() {
            let common = common_prefix(label, key);

            if common == 0 {
                continue;
            }
            if common == label.len() {
                return child.subscribe(&key[common..]);
            }

            // split the edge at the divergence point
            let tail = label.split_off(common);
            let grand_child = std::mem::replace(child, Node::new(0));

            child.children.push((tail, grand_child));
            return child.subscribe(&key[common..]);
        }

        self.children.push((key.to_vec(), Node::new(1)));
    }

    fn unsubscribe(&mut self, key: &[u8]) -> bool {
        if key.is_empty() {
            if self.count == 0 {
                return false;
            }
            self.count -= 1;
            return true;
        }

        let mut removed = false;
        let mut prune = None;

        for (index, (label, child)) in self.children.iter_mut().enumerate() {
            let common = common_prefix(label, key);

            if common != label.len() || common == 0 {
                continue;
            }

            removed = child.unsubscribe(&key[common..]);
            if removed && child.count == 0 && child.children.is_empty() {
                prune = Some(index);
            }
            break;
        }

        if let Some(index) = prune {
            self.children.swap_remove(index);
        }

        removed
    }

    fn matches(&self, data: &[u8]) -> bool {
        if self.count > 0 {
            return true;
        }

        for (label, child) in self.children.iter() {
            if data.len() >= label.len() && &data[..label.len()] == label.as_slice() {
                return child.matches(&data[label.len()..]);
            }
        }

        false
    }
}

pub struct Trie {
    root: Node
}

impl Trie {
    pub fn new() -> Trie {
        Trie { root: Node::new(0) }
    }

    pub fn subscribe(&mut self, prefix: &[u8]) {
        self.root.subscribe(prefix);
    }

    /// True when the prefix was subscribed; over-unsubscription is refused.
    pub fn unsubscribe(&mut self, prefix: &[u8]) -> bool {
        self.root.unsubscribe(prefix)
    }

    pub fn matches(&self, data: &[u8]) -> bool {
        self.root.matches(data)
    }
}

impl Default for Trie {
    fn default() -> Self {
        Trie::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_prefix_matches_everything() {
        let mut trie = Trie::new();

        trie.subscribe(b"");

        assert!(trie.matches(b""));
        assert!(trie.matches(b"anything"));
    }

    #[test]
    fn subscriptions_match_by_prefix() {
        let mut trie = Trie::new();

        trie.subscribe(b"hello");

        assert!(trie.matches(b"hello"));
        assert!(trie.matches(b"hello, world"));
        assert!(!trie.matches(b"hell"));
        assert!(!trie.matches(b"help"));
        assert!(!trie.matches(b""));
    }

    #[test]
    fn diverging_keys_split_edges() {
        let mut trie = Trie::new();

        trie.subscribe(b"hello");
        trie.subscribe(b"help");
        trie.subscribe(b"world");

        assert!(trie.matches(b"hello!"));
        assert!(trie.matches(b"helpful"));
        assert!(trie.matches(b"worldwide"));
        assert!(!trie.matches(b"hel"));
    }

    #[test]
    fn unsubscribe_restores_the_previous_behaviour() {
        let mut trie = Trie::new();

        trie.subscribe(b"topic");
        trie.subscribe(b"topic");

        assert!(trie.unsubscribe(b"topic"));
        assert!(trie.matches(b"topical"));
        assert!(trie.unsubscribe(b"topic"));
        assert!(!trie.matches(b"topical"));
        assert!(!trie.unsubscribe(b"topic"));
        assert!(!trie.unsubscribe(b"never"));
    }

    #[test]
    fn nested_prefixes_count_independently() {
        let mut trie = Trie::new();

        trie.subscribe(b"a");
        trie.subscribe(b"ab");

        assert!(trie.unsubscribe(b"a"));
        assert!(!trie.matches(b"ax"));
        assert!(trie.matches(b"abx"));
    }
}
