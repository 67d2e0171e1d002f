//! Chat command parsing

use crate::error::CoverError;
use vcover_common::BackendKind;

/// Pitch shift range accepted as a trailing argument, in semitones
pub const KEY_SHIFT_RANGE: std::ops::RangeInclusive<i32> = -12..=12;

/// A recognized chat command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `rvc|svc <song> [shift]`
    Cover { kind: BackendKind, args: Vec<String> },
    /// `刷新rvc模型` / `刷新svc模型`
    RefreshCatalog(BackendKind),
    /// `设置rvc后端链接 [URL]` / `设置svc后端链接 [URL]`
    SetBaseUrl { kind: BackendKind, url: Option<String> },
}

/// Arguments of a cover command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoverArgs {
    pub song_name: String,
    pub key_shift: i32,
}

/// Recognize a command; `None` for ordinary chat
///
/// The command keyword is the first whitespace-separated token, matched
/// exactly after an optional leading `/`.
pub fn parse_command(text: &str) -> Option<Command> {
    let text = text.trim();
    let text = text.strip_prefix('/').unwrap_or(text);
    let mut tokens = text.split_whitespace();
    let keyword = tokens.next()?;
    let args: Vec<String> = tokens.map(str::to_string).collect();

    BackendKind::ALL.into_iter().find_map(|kind| {
        let name = kind.as_str();
        if keyword == name {
            Some(Command::Cover {
                kind,
                args: args.clone(),
            })
        } else if keyword == format!("刷新{}模型", name) {
            Some(Command::RefreshCatalog(kind))
        } else if keyword == format!("设置{}后端链接", name) {
            Some(Command::SetBaseUrl {
                kind,
                url: args.first().cloned(),
            })
        } else {
            None
        }
    })
}

/// Usage text of a cover command
pub fn cover_usage(kind: BackendKind) -> String {
    format!("用法: /{} <歌名> [升降调]", kind.as_str())
}

/// Split cover arguments into song name and pitch shift
///
/// A trailing integer in [`KEY_SHIFT_RANGE`] is the shift, but only when
/// other tokens remain for the name; a lone numeric token is the name.
pub fn parse_cover_args(kind: BackendKind, args: &[String]) -> Result<CoverArgs, CoverError> {
    let Some((last, rest)) = args.split_last() else {
        return Err(CoverError::InvalidArguments(cover_usage(kind)));
    };

    if !rest.is_empty() {
        if let Some(shift) = parse_key_shift(last) {
            return Ok(CoverArgs {
                song_name: rest.join(" "),
                key_shift: shift,
            });
        }
    }

    Ok(CoverArgs {
        song_name: args.join(" "),
        key_shift: 0,
    })
}

/// Optional single `-` followed by ASCII digits, within range
fn parse_key_shift(token: &str) -> Option<i32> {
    let digits = token.strip_prefix('-').unwrap_or(token);
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    token
        .parse::<i32>()
        .ok()
        .filter(|shift| KEY_SHIFT_RANGE.contains(shift))
}
