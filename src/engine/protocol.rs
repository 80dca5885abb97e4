//! MakeMKV robot-mode output protocol
//!
//! With `-r --progress=-stdout` the engine emits one record per line,
//! `TAG:field,field,...`, where fields may be double-quoted strings that
//! themselves contain commas and colons. This module decodes a raw line
//! into an [`EngineRecord`].

use std::str::FromStr;

/// One decoded line of engine output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineRecord {
    /// `MSG` - informational text with a numeric message code.
    Message { code: u32, text: String },
    /// `CINFO` - one disc-level attribute.
    DiscField { attr: u32, value: String },
    /// `TINFO` - one attribute of one title.
    TitleField { title: u32, attr: u32, value: String },
    /// `PRGC` - next description for the current-item progress bar.
    CurrentTask { label: String },
    /// `PRGT` - next description for the session-total progress bar.
    TotalTask { label: String },
    /// `PRGV` - raw progress values on a fixed 0..=65536 scale.
    Progress { current: u64, total: u64, max: u64 },
    /// Any record kind this program does not act on (`DRV`, `TCOUNT`, ...).
    Other,
}

/// Decode one raw engine line.
///
/// The tag is everything before the first colon; the remainder is a
/// comma-delimited field list honoring quoting. Lines without a colon or
/// with malformed quoting are errors; callers skip them and keep reading.
pub fn parse_line(line: &str) -> Result<EngineRecord, String> {
    let (tag, rest) = line
        .split_once(':')
        .ok_or_else(|| format!("No tag separator in line {:?}", line))?;
    let fields = split_fields(rest)?;
    decode(tag, &fields)
}

fn decode(tag: &str, fields: &[String]) -> Result<EngineRecord, String> {
    match tag {
        "MSG" => Ok(EngineRecord::Message {
            code: numeric_field(fields, 0, tag)?,
            text: text_field(fields, 2, tag)?.to_string(),
        }),
        "CINFO" => Ok(EngineRecord::DiscField {
            attr: numeric_field(fields, 0, tag)?,
            value: text_field(fields, 2, tag)?.to_string(),
        }),
        "TINFO" => Ok(EngineRecord::TitleField {
            title: numeric_field(fields, 0, tag)?,
            attr: numeric_field(fields, 1, tag)?,
            value: text_field(fields, 3, tag)?.to_string(),
        }),
        "PRGC" => Ok(EngineRecord::CurrentTask {
            label: text_field(fields, 2, tag)?.to_string(),
        }),
        "PRGT" => Ok(EngineRecord::TotalTask {
            label: text_field(fields, 2, tag)?.to_string(),
        }),
        "PRGV" => Ok(EngineRecord::Progress {
            current: numeric_field(fields, 0, tag)?,
            total: numeric_field(fields, 1, tag)?,
            max: numeric_field(fields, 2, tag)?,
        }),
        _ => Ok(EngineRecord::Other),
    }
}

fn text_field<'a>(fields: &'a [String], index: usize, tag: &str) -> Result<&'a str, String> {
    fields
        .get(index)
        .map(String::as_str)
        .ok_or_else(|| format!("{} record is missing field {}", tag, index))
}

fn numeric_field<T: FromStr>(fields: &[String], index: usize, tag: &str) -> Result<T, String> {
    let raw = text_field(fields, index, tag)?;
    raw.parse()
        .map_err(|_| format!("{} field {} is not numeric: {:?}", tag, index, raw))
}

/// Split a comma-delimited field list, honoring double quotes.
///
/// Inside quotes, commas and colons are data and `""` is a literal quote.
/// Whitespace between a delimiter and an opening quote is skipped.
fn split_fields(input: &str) -> Result<Vec<String>, String> {
    let mut fields = Vec::new();
    let mut chars = input.chars().peekable();

    loop {
        while chars.peek() == Some(&' ') {
            chars.next();
        }

        let mut field = String::new();
        if chars.peek() == Some(&'"') {
            chars.next();
            loop {
                match chars.next() {
                    Some('"') if chars.peek() == Some(&'"') => {
                        chars.next();
                        field.push('"');
                    }
                    Some('"') => break,
                    Some(c) => field.push(c),
                    None => return Err("Unterminated quoted field".to_string()),
                }
            }
            fields.push(field);
            match chars.next() {
                None => return Ok(fields),
                Some(',') => {}
                Some(c) => {
                    return Err(format!("Unexpected character {:?} after closing quote", c));
                }
            }
        } else {
            loop {
                match chars.next() {
                    Some(',') => break,
                    Some(c) => field.push(c),
                    None => {
                        fields.push(field);
                        return Ok(fields);
                    }
                }
            }
            fields.push(field);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_line_decodes_code_and_text() {
        let record = parse_line("MSG:3307,0,\"some text\",0").unwrap();
        assert_eq!(
            record,
            EngineRecord::Message {
                code: 3307,
                text: "some text".to_string(),
            }
        );
    }

    #[test]
    fn test_quoted_comma_stays_in_one_field() {
        let record = parse_line("CINFO:2,0,\"My Movie, Vol. 1\"").unwrap();
        assert_eq!(
            record,
            EngineRecord::DiscField {
                attr: 2,
                value: "My Movie, Vol. 1".to_string(),
            }
        );
    }

    #[test]
    fn test_quoted_colon_is_not_a_tag_separator() {
        let record = parse_line("CINFO:2,0,\"Movie: The Sequel\"").unwrap();
        assert_eq!(
            record,
            EngineRecord::DiscField {
                attr: 2,
                value: "Movie: The Sequel".to_string(),
            }
        );
    }

    #[test]
    fn test_doubled_quotes_decode_to_literal_quote() {
        let record = parse_line("MSG:9999,0,\"say \"\"hi\"\"\",0").unwrap();
        assert_eq!(
            record,
            EngineRecord::Message {
                code: 9999,
                text: "say \"hi\"".to_string(),
            }
        );
    }

    #[test]
    fn test_title_field_positions() {
        let record = parse_line("TINFO:1,9,0,\"1:30:45\"").unwrap();
        assert_eq!(
            record,
            EngineRecord::TitleField {
                title: 1,
                attr: 9,
                value: "1:30:45".to_string(),
            }
        );
    }

    #[test]
    fn test_progress_values_decode_all_three_fields() {
        let record = parse_line("PRGV:12345,23456,65536").unwrap();
        assert_eq!(
            record,
            EngineRecord::Progress {
                current: 12345,
                total: 23456,
                max: 65536,
            }
        );
    }

    #[test]
    fn test_bar_labels_come_from_the_third_field() {
        let current = parse_line("PRGC:5057,0,\"Analyzing seamless segments\"").unwrap();
        assert_eq!(
            current,
            EngineRecord::CurrentTask {
                label: "Analyzing seamless segments".to_string(),
            }
        );

        let total = parse_line("PRGT:5018,0,\"Saving to MKV file\"").unwrap();
        assert_eq!(
            total,
            EngineRecord::TotalTask {
                label: "Saving to MKV file".to_string(),
            }
        );
    }

    #[test]
    fn test_space_after_delimiter_is_skipped() {
        let record = parse_line("MSG:9999, 0, \"padded\", 0").unwrap();
        assert_eq!(
            record,
            EngineRecord::Message {
                code: 9999,
                text: "padded".to_string(),
            }
        );
    }

    #[test]
    fn test_unknown_tags_are_passed_over() {
        assert_eq!(
            parse_line("DRV:0,2,999,1,\"DVD drive\",\"DISC\",\"/dev/sr0\"").unwrap(),
            EngineRecord::Other
        );
        assert_eq!(parse_line("TCOUNT:3").unwrap(), EngineRecord::Other);
    }

    #[test]
    fn test_line_without_colon_is_an_error() {
        assert!(parse_line("not a protocol line").is_err());
    }

    #[test]
    fn test_unterminated_quote_is_an_error() {
        assert!(parse_line("CINFO:2,0,\"runaway").is_err());
    }

    #[test]
    fn test_non_numeric_code_is_an_error() {
        assert!(parse_line("MSG:abc,0,\"text\",0").is_err());
    }

    #[test]
    fn test_missing_fields_are_an_error() {
        assert!(parse_line("MSG:3307").is_err());
        assert!(parse_line("PRGV:100").is_err());
    }
}
