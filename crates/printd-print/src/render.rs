// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Printer-native payload rendering.
//
// Labels are TSPL programs (thermal label printers), receipts are ESC/POS
// byte streams (thermal receipt printers). Both are sent with `-o raw`, so
// what is built here is exactly what reaches the device.

use serde::Deserialize;

/// Dots per millimetre at 203 dpi, the common thermal printer resolution.
const DOTS_PER_MM: u32 = 8;

/// Left margin and first baseline of label text, in dots.
const LABEL_X: u32 = 10;
const LABEL_Y: u32 = 20;

/// Width and line advance of TSPL font "2" (12 x 20 dots), in dots.
const FONT_WIDTH: u32 = 12;
const LINE_STEP: u32 = 24;

/// Size of the QR code cell in dots and its rendered width (version 3, 29 modules).
const QR_CELL: u32 = 4;
const QR_WIDTH: u32 = 29 * QR_CELL;

/// ESC/POS: initialise printer.
const ESC_INIT: [u8; 2] = [0x1B, 0x40];
/// ESC/POS: feed four lines so the cut clears the last printed line.
const ESC_FEED: [u8; 3] = [0x1B, 0x64, 0x04];
/// ESC/POS: GS V A 0, full cut.
const GS_CUT: [u8; 4] = [0x1D, 0x56, 0x41, 0x00];

/// Builder for a TSPL label program.
#[derive(Debug, Clone)]
pub struct TsplLabel {
    width_mm: u32,
    height_mm: u32,
    lines: Vec<String>,
    qr: Option<String>,
}

impl TsplLabel {
    pub fn new(width_mm: u32, height_mm: u32) -> Self {
        Self {
            width_mm,
            height_mm,
            lines: Vec::new(),
            qr: None,
        }
    }

    /// Add text, one TSPL `TEXT` command per line. Long lines are wrapped to
    /// the label width.
    pub fn text(mut self, text: &str) -> Self {
        let columns = self.text_columns();
        for line in text.lines() {
            self.lines.extend(wrap(line, columns));
        }
        self
    }

    /// Place a QR code in the top-right corner.
    pub fn qr_code(mut self, data: &str) -> Self {
        self.qr = Some(data.to_owned());
        self
    }

    fn width_dots(&self) -> u32 {
        self.width_mm * DOTS_PER_MM
    }

    fn text_columns(&self) -> usize {
        let reserved = if self.qr.is_some() { QR_WIDTH + LABEL_X } else { 0 };
        let usable = self.width_dots().saturating_sub(2 * LABEL_X + reserved);
        (usable / FONT_WIDTH).max(1) as usize
    }

    /// The program as CRLF-separated commands.
    pub fn render(&self) -> Vec<u8> {
        let mut commands = vec![
            format!("SIZE {} mm,{} mm", self.width_mm, self.height_mm),
            "GAP 2 mm,0".to_owned(),
            "DIRECTION 1".to_owned(),
            "CLS".to_owned(),
        ];

        let mut y = LABEL_Y;
        for line in &self.lines {
            commands.push(format!(
                "TEXT {LABEL_X},{y},\"2\",0,1,1,\"{}\"",
                escape_tspl(line)
            ));
            y += LINE_STEP;
        }

        if let Some(data) = &self.qr {
            let x = self.width_dots().saturating_sub(QR_WIDTH + LABEL_X);
            commands.push(format!(
                "QRCODE {x},{LABEL_Y},M,{QR_CELL},A,0,\"{}\"",
                escape_tspl(data)
            ));
        }

        commands.push("PRINT 1".to_owned());
        commands.push("END".to_owned());
        let mut program = commands.join("\r\n");
        program.push_str("\r\n");
        program.into_bytes()
    }
}

/// TSPL string literals escape an embedded double quote as `\["]`.
fn escape_tspl(text: &str) -> String {
    text.replace('"', "\\[\"]")
}

/// Receipt paper widths and their column count in ESC/POS font A.
pub fn receipt_columns(receipt_width: &str) -> usize {
    let mm = receipt_width
        .trim()
        .trim_end_matches("mm")
        .trim()
        .parse::<u32>()
        .unwrap_or(80);
    if mm <= 58 { 32 } else { 48 }
}

/// Render plain text as an ESC/POS receipt ending in a full cut.
pub fn escpos_receipt(text: &str, columns: usize) -> Vec<u8> {
    let mut out = Vec::with_capacity(text.len() + 16);
    out.extend_from_slice(&ESC_INIT);
    for line in text.lines() {
        for wrapped in wrap(line, columns) {
            out.extend_from_slice(wrapped.as_bytes());
            out.push(b'\n');
        }
    }
    out.extend_from_slice(&ESC_FEED);
    out.extend_from_slice(&GS_CUT);
    out
}

/// A lone full-cut command.
pub fn escpos_cut() -> Vec<u8> {
    GS_CUT.to_vec()
}

/// Wrap `line` to at most `columns` characters, breaking at spaces where
/// possible. An empty line stays one empty line.
fn wrap(line: &str, columns: usize) -> Vec<String> {
    let line = line.trim_end();
    if line.chars().count() <= columns {
        return vec![line.to_owned()];
    }

    let mut out = Vec::new();
    let mut current = String::new();
    for word in line.split(' ') {
        let mut word = word;
        loop {
            let used = current.chars().count();
            let needed = word.chars().count() + usize::from(used > 0);
            if used + needed <= columns {
                if used > 0 {
                    current.push(' ');
                }
                current.push_str(word);
                break;
            }
            if used > 0 {
                out.push(std::mem::take(&mut current));
                continue;
            }
            // A single word longer than a whole line: hard split.
            let split = word
                .char_indices()
                .nth(columns)
                .map_or(word.len(), |(i, _)| i);
            out.push(word[..split].to_owned());
            word = &word[split..];
            if word.is_empty() {
                break;
            }
        }
    }
    if !current.is_empty() {
        out.push(current);
    }
    out
}

/// One fault on an engineer work order.
#[derive(Debug, Clone, Deserialize)]
pub struct Fault {
    pub fault_name: Option<String>,
    #[serde(default)]
    pub fault_plan: Vec<String>,
}

/// Engineer work-order label content.
#[derive(Debug, Clone, Deserialize)]
pub struct EngineerOrder {
    pub time: String,
    pub user: String,
    pub device: String,
    pub fault_data: Vec<Fault>,
    pub notice: Vec<String>,
    /// Encoded as a QR code when present.
    #[serde(default)]
    pub qr_url: Option<String>,
}

impl EngineerOrder {
    /// The label text, one item per line.
    pub fn format(&self) -> String {
        let rule = "-".repeat(40);
        let mut lines = vec![
            format!("Time: {}", self.time),
            format!("User: {}", self.user),
            format!("Device: {}", self.device),
            rule.clone(),
        ];

        lines.push("Faults:".to_owned());
        for (i, fault) in self.fault_data.iter().enumerate() {
            let name = fault
                .fault_name
                .clone()
                .unwrap_or_else(|| format!("Fault {}", i + 1));
            lines.push(format!("{}. {name}", i + 1));
            lines.extend(fault.fault_plan.iter().map(|plan| format!("   - {plan}")));
        }
        lines.push(rule);

        lines.push("Notes:".to_owned());
        lines.extend(self.notice.iter().map(|note| format!("* {note}")));
        lines.join("\n")
    }

    pub fn to_label(&self, width_mm: u32, height_mm: u32) -> Vec<u8> {
        let label = TsplLabel::new(width_mm, height_mm);
        let label = match &self.qr_url {
            Some(url) if !url.trim().is_empty() => label.qr_code(url),
            _ => label,
        };
        label.text(&self.format()).render()
    }
}
