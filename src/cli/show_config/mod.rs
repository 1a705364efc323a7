//! Config command - prints the resolved configuration

use crate::config::AppConfig;

pub fn run(config: &AppConfig) -> anyhow::Result<()> {
    println!("{}", render(config)?);
    Ok(())
}

fn render(config: &AppConfig) -> anyhow::Result<String> {
    Ok(serde_json::to_string_pretty(config)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_includes_every_section() {
        let rendered = render(&AppConfig::default()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&rendered).unwrap();

        for section in ["logging", "retrieval", "chunking", "ingestion", "retry", "llm", "storage"] {
            assert!(value.get(section).is_some(), "missing {}", section);
        }
        assert_eq!(value["llm"]["api_key_env"], "OPENAI_API_KEY");
    }
}
