//! Product catalogs and fuzzy name lookup

use std::collections::HashSet;
use std::fmt::Write;

use serde::{Deserialize, Serialize};

/// One row of a catalog's `product` sheet
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub name: String,
    pub price: String,
    pub description: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProductMatch {
    pub product: Product,
    /// 0..=100
    pub score: u8,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductCatalog {
    products: Vec<Product>,
}

impl ProductCatalog {
    pub fn new(products: Vec<Product>) -> Self {
        Self { products }
    }

    pub fn products(&self) -> &[Product] {
        &self.products
    }

    pub fn len(&self) -> usize {
        self.products.len()
    }

    pub fn is_empty(&self) -> bool {
        self.products.is_empty()
    }

    /// Best `limit` products by name similarity; ties keep catalog order
    pub fn search(&self, product_name: &str, limit: usize) -> Vec<ProductMatch> {
        let mut matches: Vec<ProductMatch> = self
            .products
            .iter()
            .map(|p| ProductMatch {
                score: name_similarity(product_name, &p.name),
                product: p.clone(),
            })
            .collect();

        matches.sort_by(|a, b| b.score.cmp(&a.score));
        matches.truncate(limit);
        matches
    }
}

/// Numbered listing used as the tool's answer
pub fn format_matches(query: &str, matches: &[ProductMatch]) -> String {
    if matches.is_empty() {
        return format!("No products related to {} were found.", query);
    }

    let mut out = format!("Products related to {}:\n", query);
    for (idx, m) in matches.iter().enumerate() {
        let _ = writeln!(
            out,
            "{}- Product: {}, Price: {}, Description: {}, Link: {}",
            idx + 1,
            m.product.name,
            m.product.price,
            m.product.description,
            m.product.url
        );
    }
    out
}

fn tokens(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
        .collect()
}

fn bigrams(text: &str) -> Vec<(char, char)> {
    let chars: Vec<char> = text.chars().collect();
    chars.windows(2).map(|w| (w[0], w[1])).collect()
}

/// Sørensen–Dice coefficient over character bigrams
fn dice(a: &str, b: &str) -> f32 {
    if a == b {
        return 1.0;
    }

    let a_grams = bigrams(a);
    let mut b_grams = bigrams(b);

    if a_grams.is_empty() || b_grams.is_empty() {
        return 0.0;
    }

    let total = (a_grams.len() + b_grams.len()) as f32;
    let mut shared = 0usize;

    for gram in &a_grams {
        if let Some(pos) = b_grams.iter().position(|g| g == gram) {
            b_grams.swap_remove(pos);
            shared += 1;
        }
    }

    2.0 * shared as f32 / total
}

/// Fuzzy similarity in 0..=100, robust to word order and partial names
pub fn name_similarity(query: &str, candidate: &str) -> u8 {
    let q_tokens = tokens(query);
    let c_tokens = tokens(candidate);

    if q_tokens.is_empty() || c_tokens.is_empty() {
        return 0;
    }

    let mut q_sorted = q_tokens.clone();
    q_sorted.sort();
    let mut c_sorted = c_tokens.clone();
    c_sorted.sort();
    let sorted = dice(&q_sorted.join(" "), &c_sorted.join(" "));

    let c_set: HashSet<&String> = c_tokens.iter().collect();
    let covered = q_tokens.iter().filter(|t| c_set.contains(t)).count();
    // Partial matches are discounted so exact names still win
    let coverage = 0.9 * covered as f32 / q_tokens.len() as f32;

    (sorted.max(coverage) * 100.0).round() as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    fn product(name: &str) -> Product {
        Product {
            name: name.to_string(),
            price: "10".to_string(),
            description: format!("{} description", name),
            url: format!("https://shop.example/{}", name.replace(' ', "-")),
        }
    }

    fn catalog() -> ProductCatalog {
        ProductCatalog::new(vec![
            product("Wireless Mouse"),
            product("Mechanical Keyboard"),
            product("USB-C Charger"),
            product("Gaming Mouse Pad"),
            product("Laptop Stand"),
        ])
    }

    #[test]
    fn test_name_similarity() {
        assert_eq!(name_similarity("Laptop Stand", "laptop stand"), 100);
        assert!(name_similarity("mouse wireless", "Wireless Mouse") >= 90);
        assert!(name_similarity("keybaord", "Mechanical Keyboard") > name_similarity("keybaord", "Laptop Stand"));
        assert_eq!(name_similarity("", "anything"), 0);
    }

    #[test]
    fn test_search_returns_top_three() {
        let matches = catalog().search("mouse", 3);

        assert_eq!(matches.len(), 3);
        let names: Vec<&str> = matches.iter().map(|m| m.product.name.as_str()).collect();
        assert!(names[..2].contains(&"Wireless Mouse"));
        assert!(names[..2].contains(&"Gaming Mouse Pad"));
    }

    #[test]
    fn test_format_matches() {
        let matches = catalog().search("Laptop Stand", 1);
        let text = format_matches("Laptop Stand", &matches);

        assert!(text.starts_with("Products related to Laptop Stand:"));
        assert!(text.contains("1- Product: Laptop Stand, Price: 10"));
        assert_eq!(
            format_matches("x", &[]),
            "No products related to x were found."
        );
    }
}
