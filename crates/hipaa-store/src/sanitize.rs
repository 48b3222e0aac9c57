// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Input sanitisation seam. The store treats sanitiser output as trusted text.

/// Produces a safe-to-store string from untrusted input.
pub trait Sanitizer: Send + Sync {
    /// Escape `raw` and cap the result at `max_len` characters.
    fn sanitize(&self, raw: &str, max_len: usize) -> String;
}

/// HTML-escapes markup characters, drops control characters, and truncates
/// without splitting an escape sequence or a multi-byte character.
#[derive(Debug, Default, Clone, Copy)]
pub struct HtmlSanitizer;

impl Sanitizer for HtmlSanitizer {
    fn sanitize(&self, raw: &str, max_len: usize) -> String {
        let mut out = String::with_capacity(raw.len().min(max_len.saturating_mul(6)));
        let mut used = 0usize;

        for ch in raw.trim().chars() {
            let piece = match ch {
                '&' => "&amp;",
                '<' => "&lt;",
                '>' => "&gt;",
                '"' => "&quot;",
                '\'' => "&#x27;",
                c if c.is_control() => continue,
                c => {
                    if used + 1 > max_len {
                        break;
                    }
                    out.push(c);
                    used += 1;
                    continue;
                }
            };
            // Entities are ASCII, so byte length equals character count.
            if used + piece.len() > max_len {
                break;
            }
            out.push_str(piece);
            used += piece.len();
        }

        out
    }
}
