//! Certificate template descriptors.
//!
//! A template is an ordered list of blocks positioned in percentages of the
//! page, anchored at the block's center. Percent coordinates keep one
//! template usable across backgrounds of different aspect ratios.
//!
//! Two JSON encodings are accepted:
//!
//! - the native form, `{"elements": [{"key": "...", "kind": "text", ...}]}`;
//! - the editor form, a map from element key to block, where the key
//!   `qrcode` denotes the QR block and every other key a text block.
//!   Elements keep the order they were written in, which is also the
//!   drawing order.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{CoreError, Result};

/// Element key the editor uses for the QR block.
pub const QR_ELEMENT_KEY: &str = "qrcode";

/// Horizontal alignment of text inside its frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Align {
    Left,
    #[default]
    Center,
    Right,
}

/// A text block. Coordinates and sizes are percentages of the page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextBlock {
    pub text: String,
    pub x: f64,
    pub y: f64,
    #[serde(default = "default_w")]
    pub w: f64,
    #[serde(default = "default_h")]
    pub h: f64,
    /// Font size in thousandths of the page width.
    #[serde(default = "default_font_size")]
    pub font: f64,
    #[serde(default = "default_color")]
    pub color: String,
    #[serde(default)]
    pub align: Align,
    #[serde(default)]
    pub bold: bool,
    #[serde(default)]
    pub italic: bool,
    #[serde(default = "default_font_family")]
    pub font_family: String,
}

/// The QR block: a center point in percent and a side length in points.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QrBlock {
    pub x: f64,
    pub y: f64,
    #[serde(default = "default_qr_size")]
    pub size: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Block {
    Text(TextBlock),
    Qr(QrBlock),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateElement {
    pub key: String,
    #[serde(flatten)]
    pub block: Block,
}

/// An ordered collection of positioned blocks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CertificateTemplate {
    pub elements: Vec<TemplateElement>,
}

fn default_w() -> f64 {
    50.0
}

fn default_h() -> f64 {
    10.0
}

fn default_font_size() -> f64 {
    20.0
}

fn default_color() -> String {
    "#000000".to_string()
}

fn default_font_family() -> String {
    "Helvetica".to_string()
}

fn default_qr_size() -> f64 {
    80.0
}

impl CertificateTemplate {
    /// The layout used when an event has no template of its own.
    pub fn standard() -> Self {
        Self {
            elements: vec![
                TemplateElement {
                    key: "txt1".into(),
                    block: Block::Text(TextBlock {
                        text: "CERTIFICADO".into(),
                        x: 50.0,
                        y: 20.0,
                        w: 80.0,
                        h: 10.0,
                        font: 40.0,
                        color: "#1e293b".into(),
                        align: Align::Center,
                        bold: true,
                        italic: false,
                        font_family: default_font_family(),
                    }),
                },
                TemplateElement {
                    key: "txt2".into(),
                    block: Block::Text(TextBlock {
                        text: "Certificamos que {{NOME}} participou do evento {{EVENTO}}.".into(),
                        x: 50.0,
                        y: 50.0,
                        w: 70.0,
                        h: 20.0,
                        font: 20.0,
                        color: "#475569".into(),
                        align: Align::Center,
                        bold: false,
                        italic: false,
                        font_family: default_font_family(),
                    }),
                },
                TemplateElement {
                    key: QR_ELEMENT_KEY.into(),
                    block: Block::Qr(QrBlock {
                        x: 85.0,
                        y: 85.0,
                        size: 80.0,
                    }),
                },
            ],
        }
    }

    /// Parse either JSON encoding.
    pub fn from_json(json: &str) -> Result<Self> {
        let value: Value =
            serde_json::from_str(json).map_err(|e| CoreError::InvalidTemplate(e.to_string()))?;

        match value {
            Value::Object(map) if map.contains_key("elements") => {
                serde_json::from_value(Value::Object(map))
                    .map_err(|e| CoreError::InvalidTemplate(e.to_string()))
            }
            Value::Object(map) => Self::from_editor_map(map),
            _ => Err(CoreError::InvalidTemplate("expected a JSON object".into())),
        }
    }

    fn from_editor_map(map: Map<String, Value>) -> Result<Self> {
        let mut elements = Vec::with_capacity(map.len());
        for (key, value) in map {
            let block = if key == QR_ELEMENT_KEY {
                Block::Qr(serde_json::from_value(value).map_err(|e| {
                    CoreError::InvalidTemplate(format!("{}: {}", key, e))
                })?)
            } else {
                Block::Text(serde_json::from_value(value).map_err(|e| {
                    CoreError::InvalidTemplate(format!("{}: {}", key, e))
                })?)
            };
            elements.push(TemplateElement { key, block });
        }
        Ok(Self { elements })
    }

    /// Encode in the native form.
    ///
    /// Fails on a coordinate or size that is not a finite number.
    pub fn to_json(&self) -> Result<String> {
        for element in &self.elements {
            let numbers = match &element.block {
                Block::Text(t) => vec![t.x, t.y, t.w, t.h, t.font],
                Block::Qr(q) => vec![q.x, q.y, q.size],
            };
            if let Some(n) = numbers.iter().find(|n| !n.is_finite()) {
                return Err(CoreError::InvalidTemplate(format!(
                    "{}: {} is not a finite number",
                    element.key, n
                )));
            }
        }
        serde_json::to_string(self).map_err(|e| CoreError::InvalidTemplate(e.to_string()))
    }

    /// The QR block, if the template has one.
    pub fn qr(&self) -> Option<&QrBlock> {
        self.elements.iter().find_map(|e| match &e.block {
            Block::Qr(qr) => Some(qr),
            Block::Text(_) => None,
        })
    }
}

impl Default for CertificateTemplate {
    fn default() -> Self {
        Self::standard()
    }
}
