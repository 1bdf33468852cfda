//! Span and position utilities for CST

use std::fmt;

use nom_locate::LocatedSpan;

/// CST 使用的输入类型
pub type Span<'a> = LocatedSpan<&'a str>;

/// 源码位置（行号 1-based，列号 0-based，按字符计数）
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct Position {
    pub line: usize,
    pub column: usize,
}

impl Position {
    pub fn new(line: usize, column: usize) -> Self {
        Self { line, column }
    }

    /// 从 nom_locate::Span 的当前位置创建
    pub fn from_span(span: Span) -> Self {
        Self {
            line: span.location_line() as usize,
            column: span.get_utf8_column().saturating_sub(1), // 转换为 0-based
        }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// A source range. `end` is exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct SourceSpan {
    pub start: Position,
    pub end: Position,
}

impl SourceSpan {
    pub fn new(start: Position, end: Position) -> Self {
        Self { start, end }
    }

    /// 从两个 Span 创建（表示范围）
    pub fn from_range(start_span: Span, end_span: Span) -> Self {
        Self {
            start: Position::from_span(start_span),
            end: Position::from_span(end_span),
        }
    }

    /// 空范围，起止都在 `span` 处
    pub fn empty_at(span: Span) -> Self {
        let position = Position::from_span(span);
        Self {
            start: position,
            end: position,
        }
    }

    /// Smallest span covering both `self` and `other`.
    pub fn cover(self, other: SourceSpan) -> Self {
        Self {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

impl fmt::Display for SourceSpan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nom::bytes::complete::take;
    use nom::Parser;

    #[test]
    fn test_from_range_tracks_lines() {
        let input = Span::new("ab\ncd");
        let (rest, _) = take::<usize, Span, nom::error::Error<Span>>(4usize)
            .parse(input)
            .unwrap();

        let span = SourceSpan::from_range(input, rest);
        assert_eq!(span.start, Position::new(1, 0));
        assert_eq!(span.end, Position::new(2, 1));
        assert_eq!(span.to_string(), "1:0-2:1");
    }

    #[test]
    fn test_columns_count_characters() {
        let input = Span::new("é = 1");
        let (rest, _) = take::<usize, Span, nom::error::Error<Span>>(1usize)
            .parse(input)
            .unwrap();

        assert_eq!(Position::from_span(rest), Position::new(1, 1));
    }

    #[test]
    fn test_cover() {
        let a = SourceSpan::new(Position::new(1, 4), Position::new(1, 5));
        let b = SourceSpan::new(Position::new(1, 0), Position::new(1, 1));
        assert_eq!(a.cover(b), SourceSpan::new(Position::new(1, 0), Position::new(1, 5)));
        assert!(!a.is_empty());
    }
}
