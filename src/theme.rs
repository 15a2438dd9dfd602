use std::fmt::Write;

use indexmap::IndexMap;
use crate::models::TrainCategory;
use crate::settings::DEFAULT_COLOR_KEY;

/// CSS class marking a train path with its category
#[must_use]
pub fn category_class(category: Option<TrainCategory>) -> Option<String> {
    category.map(|c| format!("category_{}", c.code()))
}

/// Stylesheet coloring train paths and labels per theme and category.
///
/// The `default` entry of a theme applies to every train of that theme and
/// is overridden by the category entries.
#[must_use]
pub fn stylesheet(color_maps: &IndexMap<String, IndexMap<String, String>>) -> String {
    let mut css = String::new();
    for (theme, colors) in color_maps {
        // Default first so category rules win by source order
        let ordered = colors
            .iter()
            .filter(|(key, _)| key.as_str() == DEFAULT_COLOR_KEY)
            .chain(colors.iter().filter(|(key, _)| key.as_str() != DEFAULT_COLOR_KEY));

        for (key, color) in ordered {
            let selector = if key == DEFAULT_COLOR_KEY {
                String::new()
            } else {
                format!(" .category_{key}")
            };
            let _ = writeln!(css, ".theme_{theme}{selector} .trainpath line {{ stroke: {color}; }}");
            let _ = writeln!(css, ".theme_{theme}{selector} text {{ fill: {color}; }}");
        }
        css.push('\n');
    }
    css
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_class() {
        assert_eq!(category_class(Some(TrainCategory::Freight)).as_deref(), Some("category_gv"));
        assert_eq!(category_class(None), None);
    }

    #[test]
    fn test_stylesheet_rules() {
        let mut dark = IndexMap::new();
        dark.insert("nv".to_string(), "#f44".to_string());
        dark.insert(DEFAULT_COLOR_KEY.to_string(), "#fff".to_string());
        let mut maps = IndexMap::new();
        maps.insert("dark".to_string(), dark);

        let css = stylesheet(&maps);
        let lines: Vec<&str> = css.lines().collect();
        assert_eq!(lines[0], ".theme_dark .trainpath line { stroke: #fff; }");
        assert_eq!(lines[1], ".theme_dark text { fill: #fff; }");
        assert_eq!(lines[2], ".theme_dark .category_nv .trainpath line { stroke: #f44; }");
        assert_eq!(lines[3], ".theme_dark .category_nv text { fill: #f44; }");
    }
}
