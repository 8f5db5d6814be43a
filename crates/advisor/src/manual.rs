pub(crate) const MANUAL_SYSTEM_PROMPT: &str = "\
You are a product documentation writer.
Write a USER GUIDE in Markdown for the given product using ONLY the provided facts.
If a fact is unknown, write \"Not specified\".
Use exactly these H2 sections in this order:

## Overview
## What's in the Box
## Quick Start
## Usage
## Safety
## Care & Maintenance
## Troubleshooting
## Technical Specs
## Warranty & Support
## FAQ

Be concise, actionable, and non-promotional.";

const SECTION_HEADINGS: &[(&str, &str)] = &[
    ("overview", "Overview"),
    ("box", "What's in the Box"),
    ("whats_in_the_box", "What's in the Box"),
    ("quick_start", "Quick Start"),
    ("setup", "Quick Start"),
    ("usage", "Usage"),
    ("how_to_use", "Usage"),
    ("safety", "Safety"),
    ("care", "Care & Maintenance"),
    ("maintenance", "Care & Maintenance"),
    ("troubleshooting", "Troubleshooting"),
    ("specs", "Technical Specs"),
    ("technical_specs", "Technical Specs"),
    ("tech_specs", "Technical Specs"),
    ("warranty", "Warranty & Support"),
    ("support", "Warranty & Support"),
    ("faq", "FAQ"),
];

/// Pulls one `## heading` block out of a generated manual. `full` returns
/// the whole document; unknown keys map to Quick Start.
pub fn extract_section(markdown: &str, section_key: &str) -> String {
    let key = if section_key.trim().is_empty() {
        "quick_start".to_string()
    } else {
        section_key.trim().to_lowercase()
    };
    if key == "full" {
        return markdown.to_string();
    }

    let heading = SECTION_HEADINGS
        .iter()
        .find(|(candidate, _)| *candidate == key)
        .map(|(_, heading)| *heading)
        .unwrap_or("Quick Start");

    let mut collected: Option<String> = None;
    for line in markdown.lines() {
        if let Some(title) = line.strip_prefix("## ") {
            if collected.is_some() {
                break;
            }
            if title.trim() == heading {
                collected = Some(line.to_string());
            }
            continue;
        }
        if let Some(section) = collected.as_mut() {
            section.push('\n');
            section.push_str(line);
        }
    }

    collected
        .map(|section| section.trim().to_string())
        .unwrap_or_else(|| format!("## {heading}\nNot specified"))
}

/// Skeleton served when the model is unavailable.
pub fn fallback_manual(product: &str) -> String {
    format!(
        "# {product} - User Guide\n\n\
         ## Overview\nNot specified\n\n\
         ## What's in the Box\nNot specified\n\n\
         ## Quick Start\n\
         1. Charge or power the device (if applicable).\n\
         2. Follow on-screen or printed setup steps.\n\
         3. Test basic operation.\n\n\
         ## Usage\nNot specified\n\n\
         ## Safety\nNot specified\n\n\
         ## Care & Maintenance\nNot specified\n\n\
         ## Troubleshooting\n- Issue: Not specified\n  Fix: Not specified\n\n\
         ## Technical Specs\nNot specified\n\n\
         ## Warranty & Support\nNot specified\n\n\
         ## FAQ\nNot specified\n"
    )
}
