//! `mnemo types` and `mnemo tags`: manage type schemas and tag colors.

use anyhow::{anyhow, bail, Result};

use mnemo_core::models::{PropertyDefinition, PropertyKind, TagConfig, TypeSchema};

use crate::workspace::Workspace;

/// Parse `key:kind` or `key:kind:required`.
pub fn parse_property_definition(raw: &str) -> Result<PropertyDefinition> {
    let mut parts = raw.split(':');
    let key = parts
        .next()
        .filter(|k| !k.is_empty())
        .ok_or_else(|| anyhow!("property definition needs a key: {}", raw))?;
    let kind = match parts.next().unwrap_or("text") {
        "text" => PropertyKind::Text,
        "number" => PropertyKind::Number,
        "boolean" | "bool" => PropertyKind::Boolean,
        "date" => PropertyKind::Date,
        "reference" | "ref" => PropertyKind::Reference,
        other => bail!(
            "unknown property kind '{}'. Must be text, number, boolean, date, or reference.",
            other
        ),
    };
    let required = match parts.next() {
        None => false,
        Some("required") => true,
        Some(other) => bail!("unexpected property flag '{}' in {}", other, raw),
    };
    Ok(PropertyDefinition {
        key: key.to_string(),
        kind,
        required,
    })
}

pub async fn run_types_list(ws: &Workspace, json: bool) -> Result<()> {
    let schemas = ws.type_schemas().await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&schemas)?);
        return Ok(());
    }
    for schema in &schemas {
        println!("{} ({})", schema.name, schema.color);
        for def in &schema.properties {
            let required = if def.required { " required" } else { "" };
            println!("    {}: {:?}{}", def.key, def.kind, required);
        }
    }
    Ok(())
}

pub async fn run_types_set(ws: &Workspace, name: &str, color: &str, props: &[String]) -> Result<()> {
    let properties = props
        .iter()
        .map(|p| parse_property_definition(p))
        .collect::<Result<Vec<_>>>()?;
    let schema = TypeSchema {
        name: name.to_string(),
        color: color.to_string(),
        properties,
    };
    ws.set_type_schema(&schema).await?;
    println!("type {} saved ({} properties)", schema.name, schema.properties.len());
    Ok(())
}

pub async fn run_tags_list(ws: &Workspace, json: bool) -> Result<()> {
    let tags = ws.tag_configs().await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&tags)?);
        return Ok(());
    }
    if tags.is_empty() {
        println!("No tag colors configured.");
    }
    for tag in &tags {
        println!("#{} {}", tag.name, tag.color);
    }
    Ok(())
}

pub async fn run_tags_set(ws: &Workspace, name: &str, color: &str) -> Result<()> {
    let tag = TagConfig {
        name: name.trim_start_matches('#').to_string(),
        color: color.to_string(),
    };
    ws.set_tag_config(&tag).await?;
    println!("tag #{} saved", tag.name);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_property_definition() {
        let d = parse_property_definition("due:date:required").unwrap();
        assert_eq!(d.key, "due");
        assert_eq!(d.kind, PropertyKind::Date);
        assert!(d.required);

        let d = parse_property_definition("notes").unwrap();
        assert_eq!(d.kind, PropertyKind::Text);
        assert!(!d.required);

        assert!(parse_property_definition("x:colour").is_err());
        assert!(parse_property_definition(":text").is_err());
        assert!(parse_property_definition("x:text:optional").is_err());
    }
}
