//! Loader for the small fragment of the stylesheet dialect the in-memory engine understands.
//!
//! ```xml
//! <Map srs="+proj=longlat +datum=WGS84 +no_defs" background-color="#b5d0d0">
//!   <Style name="land">
//!     <Rule><PolygonSymbolizer fill="#f2efe9"/></Rule>
//!   </Style>
//!   <Layer name="countries">
//!     <StyleName>land</StyleName>
//!     <Datasource>
//!       <Parameter name="type">shape</Parameter>
//!       <Parameter name="extent">-180,-90,180,90</Parameter>
//!     </Datasource>
//!   </Layer>
//! </Map>
//! ```
//!
//! Everything else in the document is ignored.

use std::collections::{BTreeMap, HashMap};

use anyhow::{anyhow, bail, Context, Result};
use roxmltree::{Document, Node};

use crate::render::viewport::BoundingBox;

pub type Rgba = [u8; 4];

#[derive(Debug, Clone, PartialEq)]
pub struct Stylesheet {
    pub srs: Option<String>,
    pub background: Option<Rgba>,
    pub layers: Vec<Layer>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Layer {
    pub name: String,
    /// Fill of the first polygon symbolizer among the layer's styles.
    pub fill: Option<Rgba>,
    pub parameters: BTreeMap<String, String>,
}

impl Layer {
    /// Extent declared by the datasource's `extent` parameter.
    pub fn extent(&self) -> Option<BoundingBox> {
        let raw = self.parameters.get("extent")?;
        let values: Vec<f64> = raw
            .split(|c: char| c == ',' || c.is_whitespace())
            .filter(|s| !s.is_empty())
            .map(str::parse)
            .collect::<Result<_, _>>()
            .ok()?;

        match values.as_slice() {
            &[min_x, min_y, max_x, max_y] => Some(BoundingBox::new(min_x, min_y, max_x, max_y)),
            _ => None,
        }
    }
}

impl Stylesheet {
    pub fn parse(xml: &str) -> Result<Stylesheet> {
        let doc = Document::parse(xml).context("failed to parse stylesheet")?;
        let root = doc.root_element();
        if !root.has_tag_name("Map") {
            bail!("Not a map file. Node 'Map' not found.");
        }

        let background = root
            .attribute("background-color")
            .map(parse_color)
            .transpose()?;

        let mut styles = HashMap::new();
        for style in root.children().filter(|n| n.has_tag_name("Style")) {
            let name = style
                .attribute("name")
                .ok_or_else(|| anyhow!("Style element is missing a name"))?;
            styles.insert(name.to_string(), polygon_fill(style)?);
        }

        let mut layers = Vec::new();
        for node in root.children().filter(|n| n.has_tag_name("Layer")) {
            layers.push(parse_layer(node, &styles)?);
        }

        Ok(Stylesheet {
            srs: root.attribute("srs").map(str::to_string),
            background,
            layers,
        })
    }
}

fn parse_layer(node: Node, styles: &HashMap<String, Option<Rgba>>) -> Result<Layer> {
    let name = node.attribute("name").unwrap_or("").to_string();

    let mut fill = None;
    for style_name in node.children().filter(|n| n.has_tag_name("StyleName")) {
        let key = style_name.text().unwrap_or("").trim();
        match styles.get(key) {
            Some(style_fill) => {
                if fill.is_none() {
                    fill = *style_fill;
                }
            }
            None => bail!("Layer '{name}' references unknown style '{key}'"),
        }
    }

    let mut parameters = BTreeMap::new();
    if let Some(datasource) = node.children().find(|n| n.has_tag_name("Datasource")) {
        for param in datasource.children().filter(|n| n.has_tag_name("Parameter")) {
            let key = param
                .attribute("name")
                .ok_or_else(|| anyhow!("Parameter in layer '{name}' is missing a name"))?;
            parameters.insert(key.to_string(), param.text().unwrap_or("").trim().to_string());
        }
    }

    Ok(Layer { name, fill, parameters })
}

fn polygon_fill(style: Node) -> Result<Option<Rgba>> {
    style
        .descendants()
        .find(|n| n.has_tag_name("PolygonSymbolizer"))
        .map(|sym| parse_color(sym.attribute("fill").unwrap_or("gray")))
        .transpose()
}

/// Parses `#rgb`, `#rrggbb`, `#rrggbbaa` and a few named colours.
pub fn parse_color(value: &str) -> Result<Rgba> {
    let value = value.trim();
    let named = match value.to_ascii_lowercase().as_str() {
        "transparent" => Some([0, 0, 0, 0]),
        "black" => Some([0, 0, 0, 255]),
        "white" => Some([255, 255, 255, 255]),
        "gray" | "grey" => Some([128, 128, 128, 255]),
        "red" => Some([255, 0, 0, 255]),
        "green" => Some([0, 128, 0, 255]),
        "blue" => Some([0, 0, 255, 255]),
        "steelblue" => Some([70, 130, 180, 255]),
        _ => None,
    };
    if let Some(c) = named {
        return Ok(c);
    }

    let hex = value
        .strip_prefix('#')
        .filter(|h| h.chars().all(|c| c.is_ascii_hexdigit()))
        .ok_or_else(|| anyhow!("failed to parse color: \"{value}\""))?;
    let byte = |s: &str| u8::from_str_radix(s, 16).map_err(|_| anyhow!("failed to parse color: \"{value}\""));

    match hex.len() {
        3 => {
            let mut out = [0, 0, 0, 255];
            for (i, c) in hex.chars().enumerate() {
                let v = byte(&c.to_string())?;
                out[i] = v * 17;
            }
            Ok(out)
        }
        6 => Ok([byte(&hex[0..2])?, byte(&hex[2..4])?, byte(&hex[4..6])?, 255]),
        8 => Ok([byte(&hex[0..2])?, byte(&hex[2..4])?, byte(&hex[4..6])?, byte(&hex[6..8])?]),
        _ => bail!("failed to parse color: \"{value}\""),
    }
}
