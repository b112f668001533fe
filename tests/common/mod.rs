//! Deterministic fixture documents, so every run exercises the same data without checking large
//! files into the repository.

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use serde_json::{Map, Value};

/// A small linear congruential generator; the fixtures only need to be reproducible.
pub struct Lcg(u64);

impl Lcg {
    pub fn new(seed: u64) -> Self {
        Lcg(seed.wrapping_mul(6364136223846793005).wrapping_add(1))
    }

    pub fn next_u32(&mut self) -> u32 {
        self.0 = self
            .0
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        (self.0 >> 33) as u32
    }

    pub fn below(&mut self, n: u32) -> u32 {
        self.next_u32() % n
    }
}

const ALPHABET: &[&str] = &["a", "b", "k", "z", "é", "\"", "\\", "\n", "\u{1F600}", " "];

fn make_string(rng: &mut Lcg, max_len: u32) -> String {
    let len = 1 + rng.below(max_len);
    (0..len)
        .map(|_| ALPHABET[rng.below(ALPHABET.len() as u32) as usize])
        .collect()
}

fn make_leaf(rng: &mut Lcg) -> Value {
    match rng.below(6) {
        0 => Value::from(rng.next_u32() as i64 - i32::MAX as i64),
        1 => Value::from(f64::from(rng.below(4000)) / 8.0),
        2 => Value::Bool(rng.below(2) == 0),
        3 => Value::Null,
        _ => Value::String(make_string(rng, 12)),
    }
}

/// A random document whose containers nest at most `max_depth` levels deep.
pub fn make_value(rng: &mut Lcg, max_depth: u32) -> Value {
    if max_depth == 0 {
        return make_leaf(rng);
    }
    let width = rng.below(8) as usize;
    match rng.below(3) {
        0 => {
            let mut map = Map::new();
            for i in 0..width {
                map.insert(
                    format!("{}{i}", make_string(rng, 6)),
                    make_value(rng, max_depth - 1),
                );
            }
            Value::Object(map)
        }
        1 => Value::Array((0..width).map(|_| make_value(rng, max_depth - 1)).collect()),
        _ => make_leaf(rng),
    }
}

/// A document with an object root, so there's always something to navigate.
pub fn make_document(seed: u64, max_depth: u32) -> Value {
    let mut rng = Lcg::new(seed);
    let mut root = Map::new();
    for i in 0..16 {
        root.insert(format!("field{i}"), make_value(&mut rng, max_depth));
    }
    Value::Object(root)
}

/// Writes `make_document(seed, max_depth)` with irregular whitespace and returns its path.
pub fn write_fixture(dir: &Path, name: &str, seed: u64, max_depth: u32) -> PathBuf {
    let value = make_document(seed, max_depth);
    let text = if seed % 2 == 0 {
        serde_json::to_string_pretty(&value).unwrap()
    } else {
        format!(" \n{}\t\n", serde_json::to_string(&value).unwrap())
    };
    let path = dir.join(name);
    fs::write(&path, text).unwrap();
    path
}
