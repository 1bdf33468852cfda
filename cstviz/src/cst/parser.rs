//! Lossless parser for a Python subset
//!
//! Every character of the input ends up in some node: whitespace belongs to
//! the punctuation or keyword it follows or precedes, blank and comment-only
//! lines become `EmptyLine`s, and each simple statement owns the rest of its
//! line through a `TrailingWhitespace`. Spans are syntactic: they start at the
//! first token of a node and end after its last token, never covering the
//! whitespace owned by a parent.
//!
//! Recursion is bounded twice. While parsing, brackets, prefix operators,
//! right operands and indented blocks each take one level of a fixed budget;
//! after the tree is built its depth is checked against a second limit, so
//! iterative constructs (long operator chains, `elif` chains) cannot produce a
//! tree too deep for the recursive walkers downstream.

use nom::{
    branch::alt,
    bytes::complete::{tag, take, take_while, take_while1, take_while_m_n},
    character::complete::{char, digit1, line_ending, one_of, satisfy},
    combinator::{opt, recognize},
    multi::many0,
    sequence::pair,
    IResult, Parser,
};
use nom_language::error::{VerboseError, VerboseErrorKind};

use super::kind::NodeKind;
use super::span::{Position, SourceSpan, Span};
use super::tree::{NodeBuilder, Scalar, SyntaxTree, Tree};
use crate::error::ParseError;

type ParseResult<'a, T> = IResult<Span<'a>, T, VerboseError<Span<'a>>>;

type ParseFailure<'a> = nom::Err<VerboseError<Span<'a>>>;

type Operand = for<'a> fn(Span<'a>, Ctx) -> ParseResult<'a, NodeBuilder>;

/// 逗号列表：元素、最后一个元素之后的空白、列表内容结束的位置
type CommaList<'a> = (Vec<NodeBuilder>, NodeBuilder, Span<'a>);

/// 解析时括号、一元运算、右操作数和代码块共用的嵌套层数
const MAX_NESTING: usize = 64;

/// 构建完成后语法树允许的最大深度
const MAX_TREE_DEPTH: usize = 500;

const KEYWORDS: &[&str] = &[
    "and", "as", "assert", "async", "await", "break", "class", "continue", "def", "del", "elif",
    "else", "except", "finally", "for", "from", "global", "if", "import", "in", "is", "lambda",
    "nonlocal", "not", "or", "pass", "raise", "return", "try", "while", "with", "yield",
];

// 运算符优先级，数值越大结合越紧
const OR: u8 = 1;
const AND: u8 = 2;
const NOT: u8 = 3;
const COMPARISON: u8 = 4;
const BIT_OR: u8 = 5;
const BIT_XOR: u8 = 6;
const BIT_AND: u8 = 7;
const SHIFT: u8 = 8;
const ARITH: u8 = 9;
const TERM: u8 = 10;
const FACTOR: u8 = 11;
const POWER: u8 = 12;

/// 二元和比较运算符，长的在前
const OPERATORS: &[(&str, NodeKind)] = &[
    ("**", NodeKind::Power),
    ("//", NodeKind::FloorDivide),
    ("<<", NodeKind::LeftShift),
    (">>", NodeKind::RightShift),
    ("==", NodeKind::Equal),
    ("!=", NodeKind::NotEqual),
    ("<=", NodeKind::LessThanEqual),
    (">=", NodeKind::GreaterThanEqual),
    ("<", NodeKind::LessThan),
    (">", NodeKind::GreaterThan),
    ("+", NodeKind::Add),
    ("-", NodeKind::Subtract),
    ("*", NodeKind::Multiply),
    ("/", NodeKind::Divide),
    ("%", NodeKind::Modulo),
    ("@", NodeKind::MatrixMultiply),
    ("|", NodeKind::BitOr),
    ("^", NodeKind::BitXor),
    ("&", NodeKind::BitAnd),
    ("or", NodeKind::Or),
    ("and", NodeKind::And),
    ("in", NodeKind::In),
    ("is", NodeKind::Is),
];

const AUGMENTED_OPERATORS: &[(&str, NodeKind)] = &[
    ("**=", NodeKind::PowerAssign),
    ("//=", NodeKind::FloorDivideAssign),
    ("<<=", NodeKind::LeftShiftAssign),
    (">>=", NodeKind::RightShiftAssign),
    ("+=", NodeKind::AddAssign),
    ("-=", NodeKind::SubtractAssign),
    ("*=", NodeKind::MultiplyAssign),
    ("/=", NodeKind::DivideAssign),
    ("%=", NodeKind::ModuloAssign),
    ("@=", NodeKind::MatrixMultiplyAssign),
    ("|=", NodeKind::BitOrAssign),
    ("^=", NodeKind::BitXorAssign),
    ("&=", NodeKind::BitAndAssign),
];

fn precedence_of(kind: NodeKind) -> u8 {
    match kind {
        NodeKind::Or => OR,
        NodeKind::And => AND,
        NodeKind::Equal
        | NodeKind::NotEqual
        | NodeKind::LessThan
        | NodeKind::LessThanEqual
        | NodeKind::GreaterThan
        | NodeKind::GreaterThanEqual
        | NodeKind::In
        | NodeKind::NotIn
        | NodeKind::Is
        | NodeKind::IsNot => COMPARISON,
        NodeKind::BitOr => BIT_OR,
        NodeKind::BitXor => BIT_XOR,
        NodeKind::BitAnd => BIT_AND,
        NodeKind::LeftShift | NodeKind::RightShift => SHIFT,
        NodeKind::Add | NodeKind::Subtract => ARITH,
        NodeKind::Multiply
        | NodeKind::Divide
        | NodeKind::FloorDivide
        | NodeKind::Modulo
        | NodeKind::MatrixMultiply => TERM,
        NodeKind::Power => POWER,
        _ => 0,
    }
}

/// 解析上下文
#[derive(Debug, Clone, Copy, Default)]
struct Ctx {
    /// 位于括号内，空白可以跨行
    nested: bool,
    depth: usize,
}

impl Ctx {
    fn descend<'a>(self, at: Span<'a>, message: &'static str) -> Result<Self, ParseFailure<'a>> {
        if self.depth >= MAX_NESTING {
            return Err(failure(at, message));
        }
        Ok(Self {
            depth: self.depth + 1,
            ..self
        })
    }

    fn deeper<'a>(self, at: Span<'a>) -> Result<Self, ParseFailure<'a>> {
        self.descend(at, "expression too deeply nested")
    }

    fn bracket<'a>(self, at: Span<'a>) -> Result<Self, ParseFailure<'a>> {
        let ctx = self.descend(at, "too many nested parentheses")?;
        Ok(Self { nested: true, ..ctx })
    }

    /// 代码块内的语句总是位于括号之外
    fn block<'a>(self, at: Span<'a>) -> Result<Self, ParseFailure<'a>> {
        let ctx = self.descend(at, "too many levels of indentation")?;
        Ok(Self {
            nested: false,
            ..ctx
        })
    }
}

/// 解析入口：整个文件解析为 Module
pub fn parse_module(source: &str) -> Result<Tree, ParseError> {
    let module = match parse_file(Span::new(source), source) {
        Ok((_, module)) => module,
        Err(nom::Err::Error(e)) | Err(nom::Err::Failure(e)) => return Err(to_parse_error(e)),
        Err(nom::Err::Incomplete(_)) => {
            return Err(ParseError {
                line: 1,
                column: 0,
                message: "incomplete input".to_string(),
            })
        }
    };

    let tree = Tree::build(module);
    let (depth, deepest) = tree.depth();
    if depth > MAX_TREE_DEPTH {
        let position = tree
            .span(deepest)
            .map_or(Position::new(1, 0), |span| span.start);
        return Err(ParseError {
            line: position.line,
            column: position.column,
            message: "expression too deeply nested".to_string(),
        });
    }

    Ok(tree)
}

fn parse_file<'a>(input: Span<'a>, source: &str) -> ParseResult<'a, NodeBuilder> {
    let (input, header) = many0(parse_empty_line).parse(input)?;
    let (input, body) = parse_statements(input, Ctx::default(), "")?;
    let (input, footer) = many0(parse_empty_line).parse(input)?;

    if !input.fragment().is_empty() {
        let message = if input.fragment().starts_with(|c| c == ' ' || c == '\t') {
            "unexpected indent"
        } else {
            "invalid syntax"
        };
        return Err(failure(input, message));
    }

    // Module 覆盖整个文件，不提供 span
    Ok((
        input,
        NodeBuilder::new(NodeKind::Module)
            .seq("body", body)
            .seq("header", header)
            .seq("footer", footer)
            .scalar("encoding", "utf-8")
            .scalar("default_indent", detect_indent(source))
            .scalar("default_newline", detect_newline(source)),
    ))
}

fn to_parse_error(error: VerboseError<Span>) -> ParseError {
    let Some(&(at, _)) = error.errors.first() else {
        return ParseError {
            line: 1,
            column: 0,
            message: "invalid syntax".to_string(),
        };
    };

    let message = error
        .errors
        .iter()
        .find_map(|(_, kind)| match kind {
            VerboseErrorKind::Context(context) => Some(context.to_string()),
            VerboseErrorKind::Char(c) => Some(format!("expected '{}'", c)),
            VerboseErrorKind::Nom(_) => None,
        })
        .unwrap_or_else(|| "invalid syntax".to_string());

    let position = Position::from_span(at);
    ParseError {
        line: position.line,
        column: position.column,
        message,
    }
}

// ===== 错误辅助 =====

fn failure<'a>(input: Span<'a>, message: &'static str) -> ParseFailure<'a> {
    nom::Err::Failure(VerboseError {
        errors: vec![(input, VerboseErrorKind::Context(message))],
    })
}

fn reject<'a, T>(input: Span<'a>, message: &'static str) -> ParseResult<'a, T> {
    Err(nom::Err::Error(VerboseError {
        errors: vec![(input, VerboseErrorKind::Context(message))],
    }))
}

/// 已经确定语法结构，后续失败不再回溯
fn commit<'a, T>(result: ParseResult<'a, T>) -> ParseResult<'a, T> {
    result.map_err(|err| match err {
        nom::Err::Error(e) => nom::Err::Failure(e),
        other => other,
    })
}

/// 同 [`commit`]，并在最内层的失败位置附上错误信息
fn expect<'a, T>(result: ParseResult<'a, T>, message: &'static str) -> ParseResult<'a, T> {
    result.map_err(|err| match err {
        nom::Err::Error(e) => {
            let at = e.errors.first().map(|(at, _)| *at);
            match at {
                Some(at) => failure(at, message),
                None => nom::Err::Failure(e),
            }
        }
        other => other,
    })
}

// ===== 文本辅助 =====

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

fn leading_indent(line: &str) -> &str {
    let end = line.find(|c| c != ' ' && c != '\t').unwrap_or(line.len());
    &line[..end]
}

fn leading_word(text: &str) -> &str {
    let end = text.find(|c| !is_ident_char(c)).unwrap_or(text.len());
    &text[..end]
}

/// `async def` 中 async 之后的单词
fn word_after<'t>(text: &'t str, word: &str) -> &'t str {
    let rest = text.get(word.len()..).unwrap_or_default();
    leading_word(rest.trim_start_matches([' ', '\t']))
}

fn starts_with_token(text: &str, token: &str) -> bool {
    text.starts_with(token)
        && (!token.starts_with(is_ident_char) || !text[token.len()..].starts_with(is_ident_char))
}

fn at_line_end(text: &str) -> bool {
    text.is_empty() || text.starts_with(['#', '\n', '\r'])
}

/// 字符串字面量开头：可选的前缀和引号
fn starts_string(text: &str) -> bool {
    let prefix = text
        .chars()
        .take(2)
        .take_while(|c| "rRbBuUfF".contains(*c))
        .count();
    text[prefix..].starts_with(['\'', '"'])
}

fn detect_indent(source: &str) -> String {
    source
        .lines()
        .find_map(|line| {
            let indent = leading_indent(line);
            let rest = &line[indent.len()..];
            (!indent.is_empty() && !rest.is_empty() && !rest.starts_with('#'))
                .then(|| indent.to_string())
        })
        .unwrap_or_else(|| "    ".to_string())
}

fn detect_newline(source: &str) -> String {
    match source.find(['\n', '\r']) {
        Some(i) if source[i..].starts_with("\r\n") => "\r\n".to_string(),
        Some(i) if source[i..].starts_with('\r') => "\r".to_string(),
        _ => "\n".to_string(),
    }
}

fn range(start: Span, end: Span) -> SourceSpan {
    SourceSpan::from_range(start, end)
}

// ===== trivia =====

/// 行内空白：空格、制表符、换页、反斜杠续行
fn parse_simple_whitespace(input: Span) -> ParseResult<NodeBuilder> {
    let start = input;
    let (input, value) = recognize(many0(alt((
        take_while1(|c: char| c == ' ' || c == '\t' || c == '\x0c'),
        recognize(pair(char('\\'), line_ending)),
    ))))
    .parse(input)?;

    Ok((
        input,
        NodeBuilder::new(NodeKind::SimpleWhitespace)
            .span(range(start, input))
            .scalar("value", *value.fragment()),
    ))
}

/// 表达式中的空白
///
/// 括号内遇到注释或换行时，空白延续到下一行的代码之前，记为
/// `ParenthesizedWhitespace`：本行余下部分、中间的空行和下一行的缩进。
fn parse_whitespace(input: Span, nested: bool) -> ParseResult<NodeBuilder> {
    let start = input;
    let (rest, simple) = parse_simple_whitespace(input)?;
    let fragment = *rest.fragment();
    if !nested || fragment.is_empty() || !at_line_end(fragment) {
        return Ok((rest, simple));
    }

    let (rest, comment) = opt(parse_comment).parse(rest)?;
    let (rest, newline) = parse_newline(rest)?;
    let first_line = NodeBuilder::new(NodeKind::TrailingWhitespace)
        .span(range(start, rest))
        .node("whitespace", simple)
        .opt("comment", comment)
        .node("newline", newline);
    let (rest, empty_lines) = many0(parse_empty_line).parse(rest)?;
    let (rest, last_line) = parse_simple_whitespace(rest)?;

    Ok((
        rest,
        NodeBuilder::new(NodeKind::ParenthesizedWhitespace)
            .span(range(start, rest))
            .node("first_line", first_line)
            .seq("empty_lines", empty_lines)
            .node("last_line", last_line),
    ))
}

fn empty_whitespace(at: Span) -> NodeBuilder {
    NodeBuilder::new(NodeKind::SimpleWhitespace)
        .span(SourceSpan::empty_at(at))
        .scalar("value", "")
}

/// 注释 # ...
fn parse_comment(input: Span) -> ParseResult<NodeBuilder> {
    let start = input;
    let (input, value) =
        recognize(pair(char('#'), take_while(|c: char| c != '\n' && c != '\r'))).parse(input)?;

    Ok((
        input,
        NodeBuilder::new(NodeKind::Comment)
            .span(range(start, input))
            .scalar("value", *value.fragment()),
    ))
}

/// 换行；"\n" 记为 None，文件末尾没有换行时记为空串
fn parse_newline(input: Span) -> ParseResult<NodeBuilder> {
    let start = input;
    if input.fragment().is_empty() {
        return Ok((
            input,
            NodeBuilder::new(NodeKind::Newline)
                .span(SourceSpan::empty_at(input))
                .scalar("value", ""),
        ));
    }

    let (input, ending) = alt((tag("\r\n"), tag("\n"), tag("\r"))).parse(input)?;
    let value = if *ending.fragment() == "\n" {
        Scalar::None
    } else {
        Scalar::from(*ending.fragment())
    };

    Ok((
        input,
        NodeBuilder::new(NodeKind::Newline)
            .span(range(start, input))
            .scalar("value", value),
    ))
}

/// 语句之后直到行尾的部分
fn parse_trailing_whitespace(input: Span) -> ParseResult<NodeBuilder> {
    let start = input;
    let (input, whitespace) = parse_simple_whitespace(input)?;
    let (input, comment) = opt(parse_comment).parse(input)?;
    let (input, newline) = parse_newline(input)?;

    Ok((
        input,
        NodeBuilder::new(NodeKind::TrailingWhitespace)
            .span(range(start, input))
            .node("whitespace", whitespace)
            .opt("comment", comment)
            .node("newline", newline),
    ))
}

fn parse_statement_end(input: Span) -> ParseResult<NodeBuilder> {
    expect(parse_trailing_whitespace(input), "invalid syntax")
}

/// 空行或只有注释的行
fn parse_empty_line(input: Span) -> ParseResult<NodeBuilder> {
    if input.fragment().is_empty() {
        return reject(input, "end of input");
    }

    let start = input;
    let (input, whitespace) = parse_simple_whitespace(input)?;
    let (input, comment) = opt(parse_comment).parse(input)?;
    let end = input;
    let (input, newline) = parse_newline(input)?;

    Ok((
        input,
        NodeBuilder::new(NodeKind::EmptyLine)
            .span(range(start, end))
            .node("whitespace", whitespace)
            .opt("comment", comment)
            .node("newline", newline),
    ))
}

// ===== tokens =====

fn parse_keyword<'a>(input: Span<'a>, keyword: &'static str) -> ParseResult<'a, Span<'a>> {
    let (rest, word) = tag(keyword).parse(input)?;
    if rest.fragment().starts_with(is_ident_char) {
        return reject(input, "expected keyword");
    }
    Ok((rest, word))
}

/// 标点 token：span 只覆盖 token 本身
fn token(
    kind: NodeKind,
    start: Span,
    end: Span,
    whitespace_before: NodeBuilder,
    whitespace_after: NodeBuilder,
) -> NodeBuilder {
    NodeBuilder::new(kind)
        .span(range(start, end))
        .node("whitespace_before", whitespace_before)
        .node("whitespace_after", whitespace_after)
}

/// `(` `[` `{` 以及其后的空白
fn parse_open_bracket<'a>(
    input: Span<'a>,
    kind: NodeKind,
    token: &'static str,
) -> ParseResult<'a, NodeBuilder> {
    let start = input;
    let (input, _) = tag(token).parse(input)?;
    let end = input;
    let (input, whitespace) = parse_whitespace(input, true)?;

    Ok((
        input,
        NodeBuilder::new(kind)
            .span(range(start, end))
            .node("whitespace_after", whitespace),
    ))
}

/// `)` `]` `}`，其前的空白由调用方解析
fn parse_close_bracket<'a>(
    input: Span<'a>,
    kind: NodeKind,
    token: &'static str,
    whitespace_before: NodeBuilder,
) -> ParseResult<'a, NodeBuilder> {
    let start = input;
    let (input, _) = tag(token).parse(input)?;

    Ok((
        input,
        NodeBuilder::new(kind)
            .span(range(start, input))
            .node("whitespace_before", whitespace_before),
    ))
}

/// 单个 `=`（排除 `==`）及两侧空白
fn parse_assign_equal(input: Span, nested: bool) -> ParseResult<NodeBuilder> {
    let (input, whitespace_before) = parse_whitespace(input, nested)?;
    let start = input;
    let (input, _) = char('=').parse(input)?;
    if input.fragment().starts_with('=') {
        return reject(start, "expected '='");
    }
    let end = input;
    let (input, whitespace_after) = parse_whitespace(input, nested)?;

    Ok((
        input,
        token(NodeKind::AssignEqual, start, end, whitespace_before, whitespace_after),
    ))
}

/// `:` 及其后的空白，返回冒号结束的位置
fn parse_colon_token<'a>(
    input: Span<'a>,
    whitespace_before: NodeBuilder,
    nested: bool,
) -> ParseResult<'a, (Span<'a>, NodeBuilder)> {
    let start = input;
    let (input, _) = char(':').parse(input)?;
    let end = input;
    let (input, whitespace_after) = parse_whitespace(input, nested)?;

    Ok((
        input,
        (
            end,
            token(NodeKind::Colon, start, end, whitespace_before, whitespace_after),
        ),
    ))
}

/// 逗号分隔的列表；每个元素末尾追加 `comma` 字段
fn parse_comma_separated<'a, F>(
    input: Span<'a>,
    nested: bool,
    mut item: F,
) -> ParseResult<'a, CommaList<'a>>
where
    F: FnMut(Span<'a>) -> ParseResult<'a, NodeBuilder>,
{
    match item(input) {
        Ok((rest, first)) => parse_comma_tail(rest, first, nested, item),
        Err(nom::Err::Error(_)) => Ok((input, (Vec::new(), empty_whitespace(input), input))),
        Err(err) => Err(err),
    }
}

/// 第一个元素已经解析完之后的部分
///
/// 以逗号结尾时，逗号之后的空白不归逗号，作为列表之后的空白返回，
/// 留给随后的右括号。
fn parse_comma_tail<'a, F>(
    mut input: Span<'a>,
    first: NodeBuilder,
    nested: bool,
    mut item: F,
) -> ParseResult<'a, CommaList<'a>>
where
    F: FnMut(Span<'a>) -> ParseResult<'a, NodeBuilder>,
{
    let mut items = Vec::new();
    let mut element = first;

    loop {
        let before_whitespace = input;
        let (rest, whitespace) = parse_whitespace(input, nested)?;
        if !rest.fragment().starts_with(',') {
            items.push(element.opt("comma", None));
            return Ok((rest, (items, whitespace, before_whitespace)));
        }

        let comma_start = rest;
        let (rest, _) = tag(",").parse(rest)?;
        let comma_end = rest;
        let (after, whitespace_after) = parse_whitespace(rest, nested)?;

        match item(after) {
            Ok((next, next_element)) => {
                let comma = token(
                    NodeKind::Comma,
                    comma_start,
                    comma_end,
                    whitespace,
                    whitespace_after,
                );
                items.push(element.node("comma", comma));
                element = next_element;
                input = next;
            }
            Err(nom::Err::Error(_)) => {
                let comma = token(
                    NodeKind::Comma,
                    comma_start,
                    comma_end,
                    whitespace,
                    empty_whitespace(comma_end),
                );
                items.push(element.node("comma", comma));
                let (rest, trailing) = parse_whitespace(comma_end, nested)?;
                return Ok((rest, (items, trailing, comma_end)));
            }
            Err(err) => return Err(err),
        }
    }
}

// ===== 原子表达式 =====

fn parse_name(input: Span) -> ParseResult<NodeBuilder> {
    let start = input;
    let (input, name) = recognize(pair(
        satisfy(|c: char| c.is_alphabetic() || c == '_'),
        take_while(is_ident_char),
    ))
    .parse(input)?;

    if KEYWORDS.contains(name.fragment()) {
        return reject(start, "unexpected keyword");
    }

    Ok((
        input,
        NodeBuilder::new(NodeKind::Name)
            .span(range(start, input))
            .scalar("value", *name.fragment()),
    ))
}

fn parse_digits(input: Span) -> ParseResult<Span> {
    recognize(pair(
        digit1,
        take_while(|c: char| c.is_ascii_digit() || c == '_'),
    ))
    .parse(input)
}

fn parse_exponent(input: Span) -> ParseResult<Span> {
    recognize((one_of("eE"), opt(one_of("+-")), parse_digits)).parse(input)
}

fn parse_float_literal(input: Span) -> ParseResult<Span> {
    alt((
        recognize((
            parse_digits,
            char('.'),
            opt(parse_digits),
            opt(parse_exponent),
        )),
        recognize((char('.'), parse_digits, opt(parse_exponent))),
        recognize((parse_digits, parse_exponent)),
    ))
    .parse(input)
}

fn parse_integer_literal(input: Span) -> ParseResult<Span> {
    alt((
        recognize((
            char('0'),
            one_of("xXoObB"),
            take_while1(|c: char| c.is_ascii_hexdigit() || c == '_'),
        )),
        parse_digits,
    ))
    .parse(input)
}

/// 数字：Integer、Float 或带 j 后缀的 Imaginary，保留原始文本
fn parse_number(input: Span) -> ParseResult<NodeBuilder> {
    let start = input;
    let (rest, kind) = match parse_float_literal(input) {
        Ok((rest, _)) => (rest, NodeKind::Float),
        Err(_) => {
            let (rest, _) = parse_integer_literal(input)?;
            (rest, NodeKind::Integer)
        }
    };
    let (rest, kind) = match rest.fragment().chars().next() {
        Some('j' | 'J') => (take(1usize).parse(rest)?.0, NodeKind::Imaginary),
        _ => (rest, kind),
    };

    let raw = &start.fragment()[..rest.location_offset() - start.location_offset()];
    Ok((
        rest,
        NodeBuilder::new(kind)
            .span(range(start, rest))
            .scalar("value", raw),
    ))
}

/// 字符串主体（含结束引号）的字符数；未闭合时返回 None
fn string_body_len(body: &str, quote: &str) -> Option<usize> {
    let mut chars = body.char_indices();
    let mut count = 0;

    while let Some((i, c)) = chars.next() {
        count += 1;
        match c {
            '\\' => {
                if chars.next().is_some() {
                    count += 1;
                }
            }
            _ if body[i..].starts_with(quote) => return Some(count - 1 + quote.len()),
            '\n' | '\r' if quote.len() == 1 => return None,
            _ => {}
        }
    }

    None
}

/// 字符串 '...' "..." '''...''' """..."""，可带前缀 r b u f
fn parse_string(input: Span) -> ParseResult<NodeBuilder> {
    let start = input;
    let (rest, prefix) =
        take_while_m_n(0, 2, |c: char| "rRbBuUfF".contains(c)).parse(input)?;

    let fragment = *rest.fragment();
    let quote = ["\"\"\"", "'''", "\"", "'"]
        .into_iter()
        .find(|quote| fragment.starts_with(quote));
    let Some(quote) = quote else {
        return reject(input, "expected string");
    };

    let Some(body_len) = string_body_len(&fragment[quote.len()..], quote) else {
        return Err(failure(start, "unterminated string literal"));
    };

    let (input, raw) = take(prefix.fragment().len() + quote.len() + body_len).parse(input)?;
    Ok((
        input,
        NodeBuilder::new(NodeKind::SimpleString)
            .span(range(start, input))
            .scalar("value", *raw.fragment()),
    ))
}

/// 相邻的字符串字面量拼接为右嵌套的 ConcatenatedString
fn parse_strings(input: Span, ctx: Ctx) -> ParseResult<NodeBuilder> {
    let (mut rest, mut last) = parse_string(input)?;
    let mut last_start = input;
    let mut strings = Vec::new();
    let mut gaps = Vec::new();

    loop {
        let (after, whitespace) = parse_whitespace(rest, ctx.nested)?;
        if !starts_string(after.fragment()) {
            break;
        }
        let (next_rest, next) = parse_string(after)?;
        strings.push((last_start, last));
        gaps.push(whitespace);
        last = next;
        last_start = after;
        rest = next_rest;
    }

    let mut node = last;
    for ((start, left), whitespace_between) in strings.into_iter().zip(gaps).rev() {
        node = NodeBuilder::new(NodeKind::ConcatenatedString)
            .span(range(start, rest))
            .node("left", left)
            .node("right", node)
            .node("whitespace_between", whitespace_between);
    }

    Ok((rest, node))
}

fn parse_ellipsis(input: Span) -> ParseResult<NodeBuilder> {
    let start = input;
    let (input, _) = tag("...").parse(input)?;
    Ok((
        input,
        NodeBuilder::new(NodeKind::Ellipsis).span(range(start, input)),
    ))
}

/// 列表、元组、集合中的一项；`*x` 本身就是一项
fn element(value: NodeBuilder) -> NodeBuilder {
    if value.kind() == NodeKind::StarredElement {
        return value;
    }
    NodeBuilder::new(NodeKind::Element)
        .span_opt(value.source_span())
        .node("value", value)
}

/// `*expr` 解包，或普通表达式
fn parse_starred(input: Span, ctx: Ctx, operand: Operand) -> ParseResult<NodeBuilder> {
    let fragment = *input.fragment();
    if !fragment.starts_with('*') || fragment.starts_with("**") {
        return operand(input, ctx);
    }

    let start = input;
    let (rest, _) = tag("*").parse(input)?;
    let (rest, whitespace_before_value) = parse_whitespace(rest, ctx.nested)?;
    let (rest, value) = expect(operand(rest, ctx), "expected expression")?;

    Ok((
        rest,
        NodeBuilder::new(NodeKind::StarredElement)
            .span(range(start, rest))
            .node("value", value)
            .node("whitespace_before_value", whitespace_before_value),
    ))
}

fn parse_list_item(input: Span, ctx: Ctx) -> ParseResult<NodeBuilder> {
    let (rest, value) = parse_starred(input, ctx, parse_test)?;
    Ok((rest, element(value)))
}

/// 后面是否紧跟推导式的 for 子句
fn at_comp_for(input: Span, nested: bool) -> bool {
    match parse_whitespace(input, nested) {
        Ok((rest, _)) => {
            let fragment = *rest.fragment();
            starts_with_token(fragment, "for")
                || (starts_with_token(fragment, "async") && word_after(fragment, "async") == "for")
        }
        Err(_) => false,
    }
}

/// `(` 开头：空元组、括号表达式、元组、生成器表达式或 `(yield)`
fn parse_paren_atom(input: Span, ctx: Ctx) -> ParseResult<NodeBuilder> {
    let start = input;
    let inner = ctx.bracket(input)?;
    let (rest, lpar) = parse_open_bracket(input, NodeKind::LeftParen, "(")?;

    if rest.fragment().starts_with(')') {
        let (rest, rpar) =
            parse_close_bracket(rest, NodeKind::RightParen, ")", empty_whitespace(rest))?;
        return Ok((
            rest,
            NodeBuilder::new(NodeKind::Tuple)
                .span(range(start, rest))
                .seq("elements", Vec::new())
                .node("lpar", lpar)
                .node("rpar", rpar),
        ));
    }

    let (rest, first) = if starts_with_token(rest.fragment(), "yield") {
        parse_yield(rest, inner)?
    } else {
        expect(parse_starred(rest, inner, parse_test), "expected expression")?
    };

    let plain = !matches!(first.kind(), NodeKind::Yield | NodeKind::StarredElement);
    if plain && at_comp_for(rest, true) {
        let (rest, for_in) = parse_comp_for(rest, inner)?;
        let (rest, whitespace) = parse_whitespace(rest, true)?;
        let (rest, rpar) = expect(
            parse_close_bracket(rest, NodeKind::RightParen, ")", whitespace),
            "expected ')'",
        )?;
        return Ok((
            rest,
            NodeBuilder::new(NodeKind::GeneratorExp)
                .span(range(start, rest))
                .node("elt", first)
                .node("for_in", for_in)
                .node("lpar", lpar)
                .node("rpar", rpar),
        ));
    }

    let (after, whitespace) = parse_whitespace(rest, true)?;
    if first.kind() != NodeKind::Yield && after.fragment().starts_with(',') {
        let (rest, (elements, whitespace, _)) =
            parse_comma_tail(rest, element(first), true, |i| parse_list_item(i, inner))?;
        let (rest, rpar) = expect(
            parse_close_bracket(rest, NodeKind::RightParen, ")", whitespace),
            "expected ')'",
        )?;
        return Ok((
            rest,
            NodeBuilder::new(NodeKind::Tuple)
                .span(range(start, rest))
                .seq("elements", elements)
                .node("lpar", lpar)
                .node("rpar", rpar),
        ));
    }

    if first.kind() == NodeKind::StarredElement {
        return Err(failure(start, "cannot use starred expression here"));
    }
    let (rest, rpar) = expect(
        parse_close_bracket(after, NodeKind::RightParen, ")", whitespace),
        "expected ')'",
    )?;

    Ok((
        rest,
        NodeBuilder::new(NodeKind::Parenthesized)
            .span(range(start, rest))
            .node("value", first)
            .node("lpar", lpar)
            .node("rpar", rpar),
    ))
}

/// `[` 开头：列表或列表推导式
fn parse_list_atom(input: Span, ctx: Ctx) -> ParseResult<NodeBuilder> {
    let start = input;
    let inner = ctx.bracket(input)?;
    let (rest, lbracket) = parse_open_bracket(input, NodeKind::LeftSquareBracket, "[")?;

    let (rest, elements, whitespace) = match parse_starred(rest, inner, parse_test) {
        Ok((rest, first)) => {
            if first.kind() != NodeKind::StarredElement && at_comp_for(rest, true) {
                let (rest, for_in) = parse_comp_for(rest, inner)?;
                let (rest, whitespace) = parse_whitespace(rest, true)?;
                let (rest, rbracket) = expect(
                    parse_close_bracket(rest, NodeKind::RightSquareBracket, "]", whitespace),
                    "expected ']'",
                )?;
                return Ok((
                    rest,
                    NodeBuilder::new(NodeKind::ListComp)
                        .span(range(start, rest))
                        .node("elt", first)
                        .node("for_in", for_in)
                        .node("lbracket", lbracket)
                        .node("rbracket", rbracket),
                ));
            }
            let (rest, (elements, whitespace, _)) =
                parse_comma_tail(rest, element(first), true, |i| parse_list_item(i, inner))?;
            (rest, elements, whitespace)
        }
        Err(nom::Err::Error(_)) => (rest, Vec::new(), empty_whitespace(rest)),
        Err(err) => return Err(err),
    };

    let (rest, rbracket) = expect(
        parse_close_bracket(rest, NodeKind::RightSquareBracket, "]", whitespace),
        "expected ']'",
    )?;

    Ok((
        rest,
        NodeBuilder::new(NodeKind::List)
            .span(range(start, rest))
            .seq("elements", elements)
            .node("lbracket", lbracket)
            .node("rbracket", rbracket),
    ))
}

/// 字典中的一项：`key: value` 或 `**mapping`
fn parse_dict_item(input: Span, ctx: Ctx) -> ParseResult<NodeBuilder> {
    let start = input;

    if input.fragment().starts_with("**") {
        let (rest, _) = tag("**").parse(input)?;
        let (rest, whitespace_before_value) = parse_whitespace(rest, ctx.nested)?;
        let (rest, value) = expect(parse_binary(rest, ctx, BIT_OR), "expected expression")?;
        return Ok((
            rest,
            NodeBuilder::new(NodeKind::StarredDictElement)
                .span(range(start, rest))
                .node("value", value)
                .node("whitespace_before_value", whitespace_before_value),
        ));
    }

    let (rest, key) = parse_test(input, ctx)?;
    let (rest, whitespace_before_colon) = parse_whitespace(rest, ctx.nested)?;
    let (rest, _) = expect(char(':').parse(rest), "expected ':'")?;
    let (rest, whitespace_after_colon) = parse_whitespace(rest, ctx.nested)?;
    let (rest, value) = expect(parse_test(rest, ctx), "expected value")?;

    Ok((
        rest,
        NodeBuilder::new(NodeKind::DictElement)
            .span(range(start, rest))
            .node("key", key)
            .node("value", value)
            .node("whitespace_before_colon", whitespace_before_colon)
            .node("whitespace_after_colon", whitespace_after_colon),
    ))
}

/// `{` 开头：字典、集合，或它们的推导式
fn parse_brace_atom(input: Span, ctx: Ctx) -> ParseResult<NodeBuilder> {
    let start = input;
    let inner = ctx.bracket(input)?;
    let (rest, lbrace) = parse_open_bracket(input, NodeKind::LeftCurlyBrace, "{")?;
    let fragment = *rest.fragment();

    // 空的 {} 是字典
    if fragment.starts_with('}') || fragment.starts_with("**") {
        let (rest, (elements, whitespace, _)) =
            parse_comma_separated(rest, true, |i| parse_dict_item(i, inner))?;
        return finish_brace(start, rest, NodeKind::Dict, elements, whitespace, lbrace);
    }

    let key_start = rest;
    let (rest, key) = expect(parse_starred(rest, inner, parse_test), "expected expression")?;
    let (after, whitespace_before_colon) = parse_whitespace(rest, true)?;

    if key.kind() == NodeKind::StarredElement || !after.fragment().starts_with(':') {
        if key.kind() != NodeKind::StarredElement && at_comp_for(rest, true) {
            let (rest, for_in) = parse_comp_for(rest, inner)?;
            let (rest, whitespace) = parse_whitespace(rest, true)?;
            let (rest, rbrace) = expect(
                parse_close_bracket(rest, NodeKind::RightCurlyBrace, "}", whitespace),
                "expected '}'",
            )?;
            return Ok((
                rest,
                NodeBuilder::new(NodeKind::SetComp)
                    .span(range(start, rest))
                    .node("elt", key)
                    .node("for_in", for_in)
                    .node("lbrace", lbrace)
                    .node("rbrace", rbrace),
            ));
        }
        let (rest, (elements, whitespace, _)) =
            parse_comma_tail(rest, element(key), true, |i| parse_list_item(i, inner))?;
        return finish_brace(start, rest, NodeKind::Set, elements, whitespace, lbrace);
    }

    let (rest, _) = tag(":").parse(after)?;
    let (rest, whitespace_after_colon) = parse_whitespace(rest, true)?;
    let (rest, value) = expect(parse_test(rest, inner), "expected value")?;

    if at_comp_for(rest, true) {
        let (rest, for_in) = parse_comp_for(rest, inner)?;
        let (rest, whitespace) = parse_whitespace(rest, true)?;
        let (rest, rbrace) = expect(
            parse_close_bracket(rest, NodeKind::RightCurlyBrace, "}", whitespace),
            "expected '}'",
        )?;
        return Ok((
            rest,
            NodeBuilder::new(NodeKind::DictComp)
                .span(range(start, rest))
                .node("key", key)
                .node("value", value)
                .node("for_in", for_in)
                .node("lbrace", lbrace)
                .node("rbrace", rbrace)
                .node("whitespace_before_colon", whitespace_before_colon)
                .node("whitespace_after_colon", whitespace_after_colon),
        ));
    }

    let first = NodeBuilder::new(NodeKind::DictElement)
        .span(range(key_start, rest))
        .node("key", key)
        .node("value", value)
        .node("whitespace_before_colon", whitespace_before_colon)
        .node("whitespace_after_colon", whitespace_after_colon);
    let (rest, (elements, whitespace, _)) =
        parse_comma_tail(rest, first, true, |i| parse_dict_item(i, inner))?;
    finish_brace(start, rest, NodeKind::Dict, elements, whitespace, lbrace)
}

fn finish_brace<'a>(
    start: Span<'a>,
    input: Span<'a>,
    kind: NodeKind,
    elements: Vec<NodeBuilder>,
    whitespace: NodeBuilder,
    lbrace: NodeBuilder,
) -> ParseResult<'a, NodeBuilder> {
    let (input, rbrace) = expect(
        parse_close_bracket(input, NodeKind::RightCurlyBrace, "}", whitespace),
        "expected '}'",
    )?;

    Ok((
        input,
        NodeBuilder::new(kind)
            .span(range(start, input))
            .seq("elements", elements)
            .node("lbrace", lbrace)
            .node("rbrace", rbrace),
    ))
}

fn parse_atom(input: Span, ctx: Ctx) -> ParseResult<NodeBuilder> {
    let fragment = *input.fragment();
    match fragment.chars().next() {
        Some('(') => parse_paren_atom(input, ctx),
        Some('[') => parse_list_atom(input, ctx),
        Some('{') => parse_brace_atom(input, ctx),
        _ if fragment.starts_with("...") => parse_ellipsis(input),
        _ if starts_string(fragment) => parse_strings(input, ctx),
        Some(c) if c.is_ascii_digit() || c == '.' => parse_number(input),
        _ => parse_name(input),
    }
}

// ===== 推导式 =====

/// 推导式中的一个 for 子句，嵌套关系在全部解析完后建立
struct CompClause<'a> {
    start: Span<'a>,
    target: NodeBuilder,
    iter: NodeBuilder,
    ifs: Vec<NodeBuilder>,
    asynchronous: Option<NodeBuilder>,
    whitespace_before: NodeBuilder,
    whitespace_after_for: NodeBuilder,
    whitespace_before_in: NodeBuilder,
    whitespace_after_in: NodeBuilder,
}

impl CompClause<'_> {
    fn into_node(self, inner_for_in: Option<NodeBuilder>, end: Position) -> NodeBuilder {
        NodeBuilder::new(NodeKind::CompFor)
            .span(SourceSpan::new(Position::from_span(self.start), end))
            .node("target", self.target)
            .node("iter", self.iter)
            .seq("ifs", self.ifs)
            .opt("inner_for_in", inner_for_in)
            .opt("asynchronous", self.asynchronous)
            .node("whitespace_before", self.whitespace_before)
            .node("whitespace_after_for", self.whitespace_after_for)
            .node("whitespace_before_in", self.whitespace_before_in)
            .node("whitespace_after_in", self.whitespace_after_in)
    }
}

/// `[async] for target in iter [if cond]...`，后续的 for 依次嵌套在 inner_for_in 中
fn parse_comp_for(input: Span, ctx: Ctx) -> ParseResult<NodeBuilder> {
    let mut clauses = Vec::new();
    let mut input = input;

    loop {
        let (rest, whitespace_before) = parse_whitespace(input, ctx.nested)?;
        let fragment = *rest.fragment();
        if !starts_with_token(fragment, "for") && !starts_with_token(fragment, "async") {
            break;
        }

        let start = rest;
        let (rest, asynchronous) = opt(|i| parse_asynchronous(i, ctx.nested)).parse(rest)?;
        let (rest, _) = expect(parse_keyword(rest, "for"), "expected 'for'")?;
        let (rest, whitespace_after_for) = parse_whitespace(rest, ctx.nested)?;
        let (rest, target) = expect(parse_target_list(rest, ctx), "expected loop target")?;
        let (rest, whitespace_before_in) = parse_whitespace(rest, ctx.nested)?;
        let (rest, _) = expect(parse_keyword(rest, "in"), "expected 'in'")?;
        let (rest, whitespace_after_in) = parse_whitespace(rest, ctx.nested)?;
        let (mut rest, iter) = expect(parse_binary(rest, ctx, OR), "expected iterable")?;

        let mut ifs = Vec::new();
        loop {
            let (after, whitespace_before) = parse_whitespace(rest, ctx.nested)?;
            if !starts_with_token(after.fragment(), "if") {
                break;
            }
            let if_start = after;
            let (after, _) = parse_keyword(after, "if")?;
            let (after, whitespace_before_test) = parse_whitespace(after, ctx.nested)?;
            let (after, test) = expect(parse_binary(after, ctx, OR), "expected condition")?;
            ifs.push(
                NodeBuilder::new(NodeKind::CompIf)
                    .span(range(if_start, after))
                    .node("test", test)
                    .node("whitespace_before", whitespace_before)
                    .node("whitespace_before_test", whitespace_before_test),
            );
            rest = after;
        }

        clauses.push(CompClause {
            start,
            target,
            iter,
            ifs,
            asynchronous,
            whitespace_before,
            whitespace_after_for,
            whitespace_before_in,
            whitespace_after_in,
        });
        input = rest;
    }

    let end = Position::from_span(input);
    let Some(last) = clauses.pop() else {
        return reject(input, "expected 'for'");
    };
    let mut node = last.into_node(None, end);
    while let Some(clause) = clauses.pop() {
        node = clause.into_node(Some(node), end);
    }

    Ok((input, node))
}

fn parse_asynchronous(input: Span, nested: bool) -> ParseResult<NodeBuilder> {
    let start = input;
    let (input, _) = parse_keyword(input, "async")?;
    let end = input;
    let (input, whitespace_after) = parse_whitespace(input, nested)?;

    Ok((
        input,
        NodeBuilder::new(NodeKind::Asynchronous)
            .span(range(start, end))
            .node("whitespace_after", whitespace_after),
    ))
}

// ===== 后缀：调用、属性、下标 =====

/// 调用参数：value、keyword=value、*args、**kwargs
fn parse_arg(input: Span, ctx: Ctx) -> ParseResult<NodeBuilder> {
    let start = input;
    let fragment = *input.fragment();
    let star = if fragment.starts_with("**") {
        "**"
    } else if fragment.starts_with('*') {
        "*"
    } else {
        ""
    };

    if !star.is_empty() {
        let (rest, _) = tag(star).parse(input)?;
        let (rest, whitespace_after_star) = parse_whitespace(rest, ctx.nested)?;
        let (rest, value) = expect(parse_test(rest, ctx), "expected argument value")?;
        return Ok((
            rest,
            NodeBuilder::new(NodeKind::Arg)
                .span(range(start, rest))
                .node("value", value)
                .opt("keyword", None)
                .opt("equal", None)
                .scalar("star", star)
                .node("whitespace_after_star", whitespace_after_star),
        ));
    }

    if let Ok((rest, (keyword, equal))) = parse_keyword_prefix(input, ctx) {
        let (rest, value) = expect(parse_test(rest, ctx), "expected argument value")?;
        return Ok((
            rest,
            NodeBuilder::new(NodeKind::Arg)
                .span(range(start, rest))
                .node("value", value)
                .node("keyword", keyword)
                .node("equal", equal)
                .scalar("star", "")
                .node("whitespace_after_star", empty_whitespace(start)),
        ));
    }

    let (rest, value) = parse_test(input, ctx)?;

    // 唯一的参数是生成器表达式时可以省略括号
    let (rest, value) = if at_comp_for(rest, ctx.nested) {
        let (rest, for_in) = parse_comp_for(rest, ctx)?;
        let generator = NodeBuilder::new(NodeKind::GeneratorExp)
            .span(range(start, rest))
            .node("elt", value)
            .node("for_in", for_in)
            .opt("lpar", None)
            .opt("rpar", None);
        (rest, generator)
    } else {
        (rest, value)
    };

    Ok((
        rest,
        NodeBuilder::new(NodeKind::Arg)
            .span(range(start, rest))
            .node("value", value)
            .opt("keyword", None)
            .opt("equal", None)
            .scalar("star", "")
            .node("whitespace_after_star", empty_whitespace(start)),
    ))
}

fn parse_keyword_prefix(input: Span, ctx: Ctx) -> ParseResult<(NodeBuilder, NodeBuilder)> {
    let (input, keyword) = parse_name(input)?;
    let (input, equal) = parse_assign_equal(input, ctx.nested)?;
    Ok((input, (keyword, equal)))
}

/// 下标中的一项：索引，或切片 `lower:upper:step`
fn parse_subscript_element(input: Span, ctx: Ctx) -> ParseResult<NodeBuilder> {
    let start = input;
    let (rest, lower) = opt(|i| parse_test(i, ctx)).parse(input)?;
    let (after_lower, whitespace) = parse_whitespace(rest, ctx.nested)?;

    if !after_lower.fragment().starts_with(':') {
        let Some(value) = lower else {
            return reject(input, "expected subscript");
        };
        let index = NodeBuilder::new(NodeKind::Index)
            .span(range(start, rest))
            .node("value", value);
        return Ok((
            rest,
            NodeBuilder::new(NodeKind::SubscriptElement)
                .span(range(start, rest))
                .node("slice", index),
        ));
    }

    let (rest, (mut end, first_colon)) = parse_colon_token(after_lower, whitespace, ctx.nested)?;
    let (rest, upper) = opt(|i| parse_test(i, ctx)).parse(rest)?;
    if upper.is_some() {
        end = rest;
    }

    let (after_upper, whitespace) = parse_whitespace(rest, ctx.nested)?;
    let (rest, second_colon, step) = if after_upper.fragment().starts_with(':') {
        let (rest, (colon_end, colon)) = parse_colon_token(after_upper, whitespace, ctx.nested)?;
        end = colon_end;
        let (rest, step) = opt(|i| parse_test(i, ctx)).parse(rest)?;
        if step.is_some() {
            end = rest;
        }
        (rest, Some(colon), step)
    } else {
        (rest, None, None)
    };

    let slice = NodeBuilder::new(NodeKind::Slice)
        .span(range(start, end))
        .opt("lower", lower)
        .opt("upper", upper)
        .opt("step", step)
        .node("first_colon", first_colon)
        .opt("second_colon", second_colon);

    Ok((
        rest,
        NodeBuilder::new(NodeKind::SubscriptElement)
            .span(range(start, end))
            .node("slice", slice),
    ))
}

fn parse_primary(input: Span, ctx: Ctx) -> ParseResult<NodeBuilder> {
    let start = input;
    let (mut input, mut node) = parse_atom(input, ctx)?;

    loop {
        let (rest, whitespace) = parse_whitespace(input, ctx.nested)?;
        let fragment = *rest.fragment();

        if fragment.starts_with('(') {
            let inner = ctx.bracket(rest)?;
            let (rest, lpar) = parse_open_bracket(rest, NodeKind::LeftParen, "(")?;
            let (rest, (args, whitespace_before_rpar, _)) =
                parse_comma_separated(rest, true, |i| parse_arg(i, inner))?;
            let (rest, rpar) = expect(
                parse_close_bracket(rest, NodeKind::RightParen, ")", whitespace_before_rpar),
                "expected ')'",
            )?;

            node = NodeBuilder::new(NodeKind::Call)
                .span(range(start, rest))
                .node("func", node)
                .seq("args", args)
                .node("whitespace_after_func", whitespace)
                .node("lpar", lpar)
                .node("rpar", rpar);
            input = rest;
        } else if fragment.starts_with('[') {
            let inner = ctx.bracket(rest)?;
            let (rest, lbracket) =
                parse_open_bracket(rest, NodeKind::LeftSquareBracket, "[")?;
            let (rest, (elements, whitespace_before, _)) =
                parse_comma_separated(rest, true, |i| parse_subscript_element(i, inner))?;
            if elements.is_empty() {
                return Err(failure(rest, "expected subscript"));
            }
            let (rest, rbracket) = expect(
                parse_close_bracket(rest, NodeKind::RightSquareBracket, "]", whitespace_before),
                "expected ']'",
            )?;

            node = NodeBuilder::new(NodeKind::Subscript)
                .span(range(start, rest))
                .node("value", node)
                .seq("slice", elements)
                .node("lbracket", lbracket)
                .node("rbracket", rbracket)
                .node("whitespace_after_value", whitespace);
            input = rest;
        } else if fragment.starts_with('.') && !fragment.starts_with("...") {
            let dot_start = rest;
            let (rest, _) = tag(".").parse(rest)?;
            let dot_end = rest;
            let (rest, whitespace_after) = parse_whitespace(rest, ctx.nested)?;
            let (rest, attr) = expect(parse_name(rest), "expected attribute name")?;

            let dot = token(NodeKind::Dot, dot_start, dot_end, whitespace, whitespace_after);
            node = NodeBuilder::new(NodeKind::Attribute)
                .span(range(start, rest))
                .node("value", node)
                .node("attr", attr)
                .node("dot", dot);
            input = rest;
        } else {
            break;
        }
    }

    Ok((input, node))
}

// ===== 运算符 =====

/// 表中的运算符 token 及两侧空白，同时返回 token 的起点
fn parse_operator_token<'a>(
    input: Span<'a>,
    nested: bool,
    operators: &[(&'static str, NodeKind)],
) -> ParseResult<'a, (Span<'a>, NodeBuilder)> {
    let (rest, whitespace_before) = parse_whitespace(input, nested)?;
    let fragment = *rest.fragment();
    let Some(&(text, kind)) = operators
        .iter()
        .find(|(text, _)| starts_with_token(fragment, text))
    else {
        return reject(rest, "expected operator");
    };

    let start = rest;
    let (rest, _) = tag(text).parse(rest)?;
    let end = rest;
    let (rest, whitespace_after) = parse_whitespace(rest, nested)?;

    Ok((
        rest,
        (start, token(kind, start, end, whitespace_before, whitespace_after)),
    ))
}

fn parse_two_words<'a>(
    input: Span<'a>,
    first: &'static str,
    second: &'static str,
    nested: bool,
) -> ParseResult<'a, NodeBuilder> {
    let (input, _) = parse_keyword(input, first)?;
    let (input, whitespace_between) = parse_whitespace(input, nested)?;
    let (input, _) = parse_keyword(input, second)?;
    Ok((input, whitespace_between))
}

/// 二元或比较运算符；`not in` 与 `is not` 先于单词运算符匹配
fn parse_operator(input: Span, nested: bool) -> ParseResult<(Span, NodeBuilder)> {
    let (rest, whitespace_before) = parse_whitespace(input, nested)?;
    let start = rest;

    let two_words = [("not", "in", NodeKind::NotIn), ("is", "not", NodeKind::IsNot)]
        .into_iter()
        .find_map(|(first, second, kind)| {
            parse_two_words(rest, first, second, nested)
                .ok()
                .map(|(end, between)| (end, kind, between))
        });
    let Some((end, kind, between)) = two_words else {
        let (rest, (start, operator)) = parse_operator_token(input, nested, OPERATORS)?;
        // `+=` 之类是增量赋值，不是二元运算
        let text = operator.kind().token().unwrap_or_default();
        if !text.ends_with('=')
            && !text.starts_with(is_ident_char)
            && start.fragment()[text.len()..].starts_with('=')
        {
            return reject(start, "expected operator");
        }
        return Ok((rest, (start, operator)));
    };

    let (rest, whitespace_after) = parse_whitespace(end, nested)?;
    Ok((
        rest,
        (
            start,
            NodeBuilder::new(kind)
                .span(range(start, end))
                .node("whitespace_before", whitespace_before)
                .node("whitespace_between", between)
                .node("whitespace_after", whitespace_after),
        ),
    ))
}

/// 优先级不低于 `min` 的二元运算、比较链和布尔运算
///
/// 左结合的运算在循环中向左累积，只有右操作数递归。
fn parse_binary(input: Span, ctx: Ctx, min: u8) -> ParseResult<NodeBuilder> {
    let start = input;
    let (mut input, mut left) = parse_prefix(input, ctx, min)?;

    loop {
        let Ok((rest, (operator_start, operator))) = parse_operator(input, ctx.nested) else {
            break;
        };
        let precedence = precedence_of(operator.kind());
        if precedence < min {
            break;
        }
        let inner = ctx.deeper(rest)?;

        if precedence == COMPARISON {
            let mut comparisons = Vec::new();
            let mut next = Some((rest, operator_start, operator));
            while let Some((rest, operator_start, operator)) = next.take() {
                match parse_binary(rest, inner, BIT_OR) {
                    Ok((rest, comparator)) => {
                        comparisons.push(
                            NodeBuilder::new(NodeKind::ComparisonTarget)
                                .span(range(operator_start, rest))
                                .node("operator", operator)
                                .node("comparator", comparator),
                        );
                        input = rest;
                    }
                    Err(nom::Err::Error(_)) => break,
                    Err(err) => return Err(err),
                }
                next = match parse_operator(input, ctx.nested) {
                    Ok((rest, (start, operator)))
                        if precedence_of(operator.kind()) == COMPARISON =>
                    {
                        Some((rest, start, operator))
                    }
                    _ => None,
                };
            }
            if comparisons.is_empty() {
                break;
            }

            left = NodeBuilder::new(NodeKind::Comparison)
                .span(range(start, input))
                .node("left", left)
                .seq("comparisons", comparisons);
            continue;
        }

        // ** 右结合，右侧可以是一元运算
        let right_min = if precedence == POWER {
            FACTOR
        } else {
            precedence + 1
        };
        match parse_binary(rest, inner, right_min) {
            Ok((rest, right)) => {
                let kind = if precedence <= AND {
                    NodeKind::BooleanOperation
                } else {
                    NodeKind::BinaryOperation
                };
                left = NodeBuilder::new(kind)
                    .span(range(start, rest))
                    .node("left", left)
                    .node("operator", operator)
                    .node("right", right);
                input = rest;
            }
            Err(nom::Err::Error(_)) => break,
            Err(err) => return Err(err),
        }
    }

    Ok((input, left))
}

/// 一元 + - ~ 与 not，以及 await
fn parse_prefix(input: Span, ctx: Ctx, min: u8) -> ParseResult<NodeBuilder> {
    let start = input;
    let fragment = *input.fragment();
    let (kind, operand_min) = match fragment.chars().next() {
        Some('-') => (NodeKind::Minus, FACTOR),
        Some('+') => (NodeKind::Plus, FACTOR),
        Some('~') => (NodeKind::BitInvert, FACTOR),
        _ if min <= NOT && starts_with_token(fragment, "not") => (NodeKind::Not, NOT),
        _ if starts_with_token(fragment, "await") => return parse_await(input, ctx),
        _ => return parse_primary(input, ctx),
    };

    let inner = ctx.deeper(input)?;
    let length = kind.token().map_or(1, str::len);
    let (rest, _) = take(length).parse(input)?;
    let operator_end = rest;
    let (rest, whitespace_after) = parse_whitespace(rest, ctx.nested)?;
    let (rest, expression) = parse_binary(rest, inner, operand_min)?;

    let operator = NodeBuilder::new(kind)
        .span(range(start, operator_end))
        .node("whitespace_after", whitespace_after);
    Ok((
        rest,
        NodeBuilder::new(NodeKind::UnaryOperation)
            .span(range(start, rest))
            .node("operator", operator)
            .node("expression", expression),
    ))
}

fn parse_await(input: Span, ctx: Ctx) -> ParseResult<NodeBuilder> {
    let start = input;
    let (rest, _) = parse_keyword(input, "await")?;
    let (rest, whitespace_after_await) = parse_whitespace(rest, ctx.nested)?;
    let (rest, expression) = expect(parse_primary(rest, ctx), "expected expression")?;

    Ok((
        rest,
        NodeBuilder::new(NodeKind::Await)
            .span(range(start, rest))
            .node("expression", expression)
            .node("whitespace_after_await", whitespace_after_await),
    ))
}

/// 完整的表达式：lambda，或带可选 `if ... else ...` 的布尔表达式
fn parse_test(input: Span, ctx: Ctx) -> ParseResult<NodeBuilder> {
    if starts_with_token(input.fragment(), "lambda") {
        return parse_lambda(input, ctx);
    }

    let start = input;
    let (rest, body) = parse_binary(input, ctx, OR)?;
    let (after, whitespace_before_if) = parse_whitespace(rest, ctx.nested)?;
    if !starts_with_token(after.fragment(), "if") {
        return Ok((rest, body));
    }

    let inner = ctx.deeper(after)?;
    let (rest, _) = parse_keyword(after, "if")?;
    let (rest, whitespace_after_if) = parse_whitespace(rest, ctx.nested)?;
    let (rest, test) = expect(parse_binary(rest, inner, OR), "expected condition")?;
    let (rest, whitespace_before_else) = parse_whitespace(rest, ctx.nested)?;
    let (rest, _) = expect(parse_keyword(rest, "else"), "expected 'else'")?;
    let (rest, whitespace_after_else) = parse_whitespace(rest, ctx.nested)?;
    let (rest, orelse) = expect(parse_test(rest, inner), "expected expression")?;

    Ok((
        rest,
        NodeBuilder::new(NodeKind::IfExp)
            .span(range(start, rest))
            .node("test", test)
            .node("body", body)
            .node("orelse", orelse)
            .node("whitespace_before_if", whitespace_before_if)
            .node("whitespace_after_if", whitespace_after_if)
            .node("whitespace_before_else", whitespace_before_else)
            .node("whitespace_after_else", whitespace_after_else),
    ))
}

fn parse_lambda(input: Span, ctx: Ctx) -> ParseResult<NodeBuilder> {
    let start = input;
    let inner = ctx.deeper(input)?;
    let (rest, _) = parse_keyword(input, "lambda")?;
    let (rest, whitespace_after_lambda) = parse_whitespace(rest, ctx.nested)?;

    let params_start = rest;
    let (rest, (params, whitespace_before_colon, params_end)) =
        parse_comma_separated(rest, ctx.nested, |i| parse_param(i, ctx, false))?;
    let params = NodeBuilder::new(NodeKind::Parameters)
        .span_opt((!params.is_empty()).then(|| range(params_start, params_end)))
        .seq("params", params)
        .opt("lpar", None)
        .opt("rpar", None);

    let (rest, (_, colon)) = expect(
        parse_colon_token(rest, whitespace_before_colon, ctx.nested),
        "expected ':'",
    )?;
    let (rest, body) = expect(parse_test(rest, inner), "expected expression")?;

    Ok((
        rest,
        NodeBuilder::new(NodeKind::Lambda)
            .span(range(start, rest))
            .node("params", params)
            .node("body", body)
            .node("colon", colon)
            .node("whitespace_after_lambda", whitespace_after_lambda),
    ))
}

/// `yield`、`yield value` 或 `yield from value`
fn parse_yield(input: Span, ctx: Ctx) -> ParseResult<NodeBuilder> {
    let start = input;
    let (rest, _) = parse_keyword(input, "yield")?;
    let keyword_end = rest;
    let (after, whitespace) = parse_whitespace(rest, ctx.nested)?;

    if starts_with_token(after.fragment(), "from") {
        let from_start = after;
        let (rest, _) = parse_keyword(after, "from")?;
        let (rest, whitespace_after_from) = parse_whitespace(rest, ctx.nested)?;
        let (rest, item) = expect(parse_test(rest, ctx), "expected expression")?;
        let from = NodeBuilder::new(NodeKind::From)
            .span(range(from_start, rest))
            .node("item", item)
            .node("whitespace_before_from", empty_whitespace(from_start))
            .node("whitespace_after_from", whitespace_after_from);
        return Ok((
            rest,
            NodeBuilder::new(NodeKind::Yield)
                .span(range(start, rest))
                .node("value", from)
                .node("whitespace_after_yield", whitespace),
        ));
    }

    let (rest, value, whitespace_after_yield) = match parse_star_expressions(after, ctx) {
        Ok((rest, value)) => (rest, Some(value), whitespace),
        Err(nom::Err::Error(_)) => (keyword_end, None, empty_whitespace(keyword_end)),
        Err(err) => return Err(err),
    };

    Ok((
        rest,
        NodeBuilder::new(NodeKind::Yield)
            .span(range(start, rest))
            .opt("value", value)
            .node("whitespace_after_yield", whitespace_after_yield),
    ))
}

/// 不带括号的元组 `a, *b`；没有逗号时就是单个表达式
fn parse_expression_list(input: Span, ctx: Ctx, operand: Operand) -> ParseResult<NodeBuilder> {
    let start = input;
    let (rest, first) = parse_starred(input, ctx, operand)?;
    let (after, _) = parse_whitespace(rest, ctx.nested)?;

    if !after.fragment().starts_with(',') {
        if first.kind() == NodeKind::StarredElement {
            return Err(failure(start, "cannot use starred expression here"));
        }
        return Ok((rest, first));
    }

    // 元组之后的空白留给调用方
    let (_, (elements, _, end)) = parse_comma_tail(rest, element(first), ctx.nested, |i| {
        parse_starred(i, ctx, operand).map(|(rest, value)| (rest, element(value)))
    })?;

    Ok((
        end,
        NodeBuilder::new(NodeKind::Tuple)
            .span(range(start, end))
            .seq("elements", elements)
            .opt("lpar", None)
            .opt("rpar", None),
    ))
}

fn parse_star_expressions(input: Span, ctx: Ctx) -> ParseResult<NodeBuilder> {
    parse_expression_list(input, ctx, parse_test)
}

/// 赋值目标只到 `|` 这一层，不会吃掉 for 语句中的 in
fn parse_target(input: Span, ctx: Ctx) -> ParseResult<NodeBuilder> {
    parse_binary(input, ctx, BIT_OR)
}

fn parse_target_list(input: Span, ctx: Ctx) -> ParseResult<NodeBuilder> {
    parse_expression_list(input, ctx, parse_target)
}

/// 赋值号右侧：yield 或表达式列表
fn parse_assign_value(input: Span, ctx: Ctx) -> ParseResult<NodeBuilder> {
    if starts_with_token(input.fragment(), "yield") {
        return parse_yield(input, ctx);
    }
    parse_star_expressions(input, ctx)
}

// ===== 简单语句 =====

fn parse_statements<'a>(
    input: Span<'a>,
    ctx: Ctx,
    indent: &str,
) -> ParseResult<'a, Vec<NodeBuilder>> {
    let mut statements = Vec::new();
    let mut remaining = input;

    loop {
        let (rest, leading_lines) = many0(parse_empty_line).parse(remaining)?;
        if rest.fragment().is_empty() || leading_indent(rest.fragment()) != indent {
            // 缩进变化：空行留给外层
            break;
        }

        let (rest, _) = take(indent.len()).parse(rest)?;
        let (rest, parsed) = commit(parse_statement(rest, ctx, indent, leading_lines))?;
        statements.extend(parsed);
        remaining = rest;
    }

    Ok((remaining, statements))
}

/// 一条复合语句，或同一行中的若干简单语句
fn parse_statement<'a>(
    input: Span<'a>,
    ctx: Ctx,
    indent: &str,
    leading_lines: Vec<NodeBuilder>,
) -> ParseResult<'a, Vec<NodeBuilder>> {
    let fragment = *input.fragment();
    let decorated = Decorated::default();

    let parsed = match leading_word(fragment) {
        _ if fragment.starts_with('@') => parse_decorated(input, ctx, indent, leading_lines),
        "def" => parse_function_def(input, ctx, indent, leading_lines, decorated),
        "class" => parse_class_def(input, ctx, indent, leading_lines, decorated),
        "if" => parse_if(input, ctx, indent, leading_lines),
        "while" => parse_while(input, ctx, indent, leading_lines),
        "for" => parse_for(input, ctx, indent, leading_lines),
        "try" => parse_try(input, ctx, indent, leading_lines),
        "with" => parse_with(input, ctx, indent, leading_lines),
        "async" => match word_after(fragment, "async") {
            "def" => parse_function_def(input, ctx, indent, leading_lines, decorated),
            "for" => parse_for(input, ctx, indent, leading_lines),
            "with" => parse_with(input, ctx, indent, leading_lines),
            _ => Err(failure(input, "invalid syntax")),
        },
        _ => return parse_simple_statements(input, ctx, leading_lines),
    };

    parsed.map(|(rest, node)| (rest, vec![node]))
}

/// 一行中以 `;` 分隔的简单语句
///
/// 只有一行的最后一条语句拥有 `trailing_whitespace`，前面的记为 None；
/// 行尾多余的 `;` 之后不再有空白。
fn parse_simple_statements(
    input: Span,
    ctx: Ctx,
    leading_lines: Vec<NodeBuilder>,
) -> ParseResult<Vec<NodeBuilder>> {
    let mut statements = Vec::new();
    let mut leading_lines = leading_lines;
    let mut input = input;

    loop {
        let (rest, statement) = parse_small_statement(input, ctx)?;
        let lines = std::mem::take(&mut leading_lines);
        let (after, whitespace) = parse_simple_whitespace(rest)?;
        if !after.fragment().starts_with(';') {
            let (rest, trailing_whitespace) = parse_statement_end(rest)?;
            statements.push(
                statement
                    .opt("semicolon", None)
                    .seq("leading_lines", lines)
                    .node("trailing_whitespace", trailing_whitespace),
            );
            return Ok((rest, statements));
        }

        let semicolon_start = after;
        let (after, _) = tag(";").parse(after)?;
        let semicolon_end = after;
        let (next, whitespace_after) = parse_simple_whitespace(after)?;

        if at_line_end(next.fragment()) {
            let semicolon = token(
                NodeKind::Semicolon,
                semicolon_start,
                semicolon_end,
                whitespace,
                empty_whitespace(semicolon_end),
            );
            let (rest, trailing_whitespace) = parse_statement_end(semicolon_end)?;
            statements.push(
                statement
                    .node("semicolon", semicolon)
                    .seq("leading_lines", lines)
                    .node("trailing_whitespace", trailing_whitespace),
            );
            return Ok((rest, statements));
        }

        let semicolon = token(
            NodeKind::Semicolon,
            semicolon_start,
            semicolon_end,
            whitespace,
            whitespace_after,
        );
        statements.push(
            statement
                .node("semicolon", semicolon)
                .seq("leading_lines", lines)
                .opt("trailing_whitespace", None),
        );
        input = next;
    }
}

/// 单条简单语句，不含分号和行尾
fn parse_small_statement(input: Span, ctx: Ctx) -> ParseResult<NodeBuilder> {
    match leading_word(input.fragment()) {
        "return" => parse_return(input, ctx),
        "pass" => parse_keyword_statement(input, NodeKind::Pass, "pass"),
        "break" => parse_keyword_statement(input, NodeKind::Break, "break"),
        "continue" => parse_keyword_statement(input, NodeKind::Continue, "continue"),
        "raise" => parse_raise(input, ctx),
        "del" => parse_del(input, ctx),
        "assert" => parse_assert(input, ctx),
        "global" => parse_names_statement(input, NodeKind::Global, "global"),
        "nonlocal" => parse_names_statement(input, NodeKind::Nonlocal, "nonlocal"),
        "import" => parse_import(input),
        "from" => parse_import_from(input, ctx),
        _ => parse_expression_statement(input, ctx),
    }
}

fn parse_keyword_statement<'a>(
    input: Span<'a>,
    kind: NodeKind,
    keyword: &'static str,
) -> ParseResult<'a, NodeBuilder> {
    let start = input;
    let (input, _) = parse_keyword(input, keyword)?;
    Ok((input, NodeBuilder::new(kind).span(range(start, input))))
}

fn parse_return(input: Span, ctx: Ctx) -> ParseResult<NodeBuilder> {
    let start = input;
    let (input, _) = parse_keyword(input, "return")?;
    let keyword_end = input;
    let (rest, whitespace) = parse_simple_whitespace(input)?;

    let (input, whitespace_after_return, value) = match parse_star_expressions(rest, ctx) {
        Ok((rest, value)) => (rest, whitespace, Some(value)),
        // 没有返回值：空白归入行尾
        Err(nom::Err::Error(_)) => (keyword_end, empty_whitespace(keyword_end), None),
        Err(err) => return Err(err),
    };

    Ok((
        input,
        NodeBuilder::new(NodeKind::Return)
            .span(range(start, input))
            .opt("value", value)
            .node("whitespace_after_return", whitespace_after_return),
    ))
}

/// raise [exc [from cause]]
fn parse_raise(input: Span, ctx: Ctx) -> ParseResult<NodeBuilder> {
    let start = input;
    let (input, _) = parse_keyword(input, "raise")?;
    let keyword_end = input;
    let (rest, whitespace) = parse_simple_whitespace(input)?;

    let (exc_end, exc) = match parse_test(rest, ctx) {
        Ok((rest, exc)) => (rest, exc),
        Err(nom::Err::Error(_)) => {
            return Ok((
                keyword_end,
                NodeBuilder::new(NodeKind::Raise)
                    .span(range(start, keyword_end))
                    .opt("exc", None)
                    .opt("cause", None)
                    .node("whitespace_after_raise", empty_whitespace(keyword_end)),
            ));
        }
        Err(err) => return Err(err),
    };

    let (after, whitespace_before_from) = parse_simple_whitespace(exc_end)?;
    let (input, cause) = if starts_with_token(after.fragment(), "from") {
        let from_start = after;
        let (rest, _) = parse_keyword(after, "from")?;
        let (rest, whitespace_after_from) = parse_simple_whitespace(rest)?;
        let (rest, item) = expect(parse_test(rest, ctx), "expected exception cause")?;
        let cause = NodeBuilder::new(NodeKind::From)
            .span(range(from_start, rest))
            .node("item", item)
            .node("whitespace_before_from", whitespace_before_from)
            .node("whitespace_after_from", whitespace_after_from);
        (rest, Some(cause))
    } else {
        (exc_end, None)
    };

    Ok((
        input,
        NodeBuilder::new(NodeKind::Raise)
            .span(range(start, input))
            .node("exc", exc)
            .opt("cause", cause)
            .node("whitespace_after_raise", whitespace),
    ))
}

fn parse_del(input: Span, ctx: Ctx) -> ParseResult<NodeBuilder> {
    let start = input;
    let (input, _) = parse_keyword(input, "del")?;
    let (input, whitespace_after_del) = parse_simple_whitespace(input)?;
    let (input, target) = expect(parse_target_list(input, ctx), "expected target")?;

    Ok((
        input,
        NodeBuilder::new(NodeKind::Del)
            .span(range(start, input))
            .node("target", target)
            .node("whitespace_after_del", whitespace_after_del),
    ))
}

/// assert test[, msg]
fn parse_assert(input: Span, ctx: Ctx) -> ParseResult<NodeBuilder> {
    let start = input;
    let (input, _) = parse_keyword(input, "assert")?;
    let (input, whitespace_after_assert) = parse_simple_whitespace(input)?;
    let (input, test) = expect(parse_test(input, ctx), "expected expression")?;

    let (after, whitespace_before_comma) = parse_simple_whitespace(input)?;
    let (input, comma, msg) = if after.fragment().starts_with(',') {
        let comma_start = after;
        let (rest, _) = tag(",").parse(after)?;
        let comma_end = rest;
        let (rest, whitespace_after_comma) = parse_simple_whitespace(rest)?;
        let (rest, msg) = expect(parse_test(rest, ctx), "expected message")?;
        let comma = token(
            NodeKind::Comma,
            comma_start,
            comma_end,
            whitespace_before_comma,
            whitespace_after_comma,
        );
        (rest, Some(comma), Some(msg))
    } else {
        (input, None, None)
    };

    Ok((
        input,
        NodeBuilder::new(NodeKind::Assert)
            .span(range(start, input))
            .node("test", test)
            .opt("comma", comma)
            .opt("msg", msg)
            .node("whitespace_after_assert", whitespace_after_assert),
    ))
}

fn parse_name_item(input: Span) -> ParseResult<NodeBuilder> {
    let start = input;
    let (input, name) = parse_name(input)?;
    Ok((
        input,
        NodeBuilder::new(NodeKind::NameItem)
            .span(range(start, input))
            .node("name", name),
    ))
}

/// global / nonlocal 名称列表
fn parse_names_statement<'a>(
    input: Span<'a>,
    kind: NodeKind,
    keyword: &'static str,
) -> ParseResult<'a, NodeBuilder> {
    let start = input;
    let (input, _) = parse_keyword(input, keyword)?;
    let (input, whitespace_after) = parse_simple_whitespace(input)?;
    let (_, (names, _, end)) = parse_comma_separated(input, false, parse_name_item)?;
    if names.is_empty() {
        return Err(failure(input, "expected name"));
    }

    let whitespace_field = match kind {
        NodeKind::Nonlocal => "whitespace_after_nonlocal",
        _ => "whitespace_after_global",
    };
    Ok((
        end,
        NodeBuilder::new(kind)
            .span(range(start, end))
            .seq("names", names)
            .node(whitespace_field, whitespace_after),
    ))
}

/// 点分名称 a.b.c
fn parse_dotted_name(input: Span) -> ParseResult<NodeBuilder> {
    let start = input;
    let (mut input, mut node) = parse_name(input)?;

    loop {
        let (rest, whitespace_before) = parse_simple_whitespace(input)?;
        if !rest.fragment().starts_with('.') {
            break;
        }
        let dot_start = rest;
        let (rest, _) = tag(".").parse(rest)?;
        let dot_end = rest;
        let (rest, whitespace_after) = parse_simple_whitespace(rest)?;
        let (rest, attr) = expect(parse_name(rest), "expected module name")?;

        let dot = token(NodeKind::Dot, dot_start, dot_end, whitespace_before, whitespace_after);
        node = NodeBuilder::new(NodeKind::Attribute)
            .span(range(start, rest))
            .node("value", node)
            .node("attr", attr)
            .node("dot", dot);
        input = rest;
    }

    Ok((input, node))
}

/// import 的单项：`a.b [as c]`；from-import 中只能是单个名称
fn parse_import_alias(input: Span, nested: bool, dotted: bool) -> ParseResult<NodeBuilder> {
    let start = input;
    let (input, name) = if dotted {
        parse_dotted_name(input)?
    } else {
        parse_name(input)?
    };
    let (input, asname) = opt(|i| parse_as_name(i, nested, parse_name)).parse(input)?;

    Ok((
        input,
        NodeBuilder::new(NodeKind::ImportAlias)
            .span(range(start, input))
            .node("name", name)
            .opt("asname", asname),
    ))
}

/// ` as target`
fn parse_as_name<'a, F>(input: Span<'a>, nested: bool, mut target: F) -> ParseResult<'a, NodeBuilder>
where
    F: FnMut(Span<'a>) -> ParseResult<'a, NodeBuilder>,
{
    let (input, whitespace_before_as) = parse_whitespace(input, nested)?;
    let start = input;
    let (input, _) = parse_keyword(input, "as")?;
    let (input, whitespace_after_as) = parse_whitespace(input, nested)?;
    let (input, name) = expect(target(input), "expected name after 'as'")?;

    Ok((
        input,
        NodeBuilder::new(NodeKind::AsName)
            .span(range(start, input))
            .node("name", name)
            .node("whitespace_before_as", whitespace_before_as)
            .node("whitespace_after_as", whitespace_after_as),
    ))
}

fn parse_import(input: Span) -> ParseResult<NodeBuilder> {
    let start = input;
    let (input, _) = parse_keyword(input, "import")?;
    let (input, whitespace_after_import) = parse_simple_whitespace(input)?;
    let (_, (names, _, end)) =
        parse_comma_separated(input, false, |i| parse_import_alias(i, false, true))?;
    if names.is_empty() {
        return Err(failure(input, "expected module name"));
    }

    // 最后一项之后的空白留给行尾
    Ok((
        end,
        NodeBuilder::new(NodeKind::Import)
            .span(range(start, end))
            .seq("names", names)
            .node("whitespace_after_import", whitespace_after_import),
    ))
}

/// from [.]module import names | (names) | *
fn parse_import_from(input: Span, ctx: Ctx) -> ParseResult<NodeBuilder> {
    let start = input;
    let (input, _) = parse_keyword(input, "from")?;
    let (mut input, whitespace_after_from) = parse_simple_whitespace(input)?;

    // 相对导入的点
    let mut dots = Vec::new();
    while input.fragment().starts_with('.') {
        let dot_start = input;
        let (rest, _) = tag(".").parse(input)?;
        dots.push((dot_start, rest));
        input = rest;
    }

    let (input, module, dot_whitespace) = match parse_dotted_name(input) {
        Ok((rest, module)) => (rest, Some(module), None),
        Err(nom::Err::Error(_)) if !dots.is_empty() => {
            let (after, whitespace) = parse_simple_whitespace(input)?;
            match parse_dotted_name(after) {
                Ok((rest, module)) => (rest, Some(module), Some(whitespace)),
                Err(nom::Err::Error(_)) => (input, None, None),
                Err(err) => return Err(err),
            }
        }
        Err(nom::Err::Error(_)) => return Err(failure(input, "expected module name")),
        Err(err) => return Err(err),
    };

    // 点与模块名之间的空白归最后一个点
    let dot = |(start, end): (Span, Span), whitespace_after| {
        token(NodeKind::Dot, start, end, empty_whitespace(start), whitespace_after)
    };
    let last = dots.pop();
    let mut relative: Vec<_> = dots
        .into_iter()
        .map(|(start, end)| dot((start, end), empty_whitespace(end)))
        .collect();
    if let Some((start, end)) = last {
        let whitespace_after = dot_whitespace.unwrap_or_else(|| empty_whitespace(end));
        relative.push(dot((start, end), whitespace_after));
    }

    let (input, whitespace_before_import) = parse_simple_whitespace(input)?;
    let (input, _) = expect(parse_keyword(input, "import"), "expected 'import'")?;
    let (input, whitespace_after_import) = parse_simple_whitespace(input)?;

    let statement = NodeBuilder::new(NodeKind::ImportFrom).opt("module", module);
    let (end, statement) = if input.fragment().starts_with('*') {
        let star_start = input;
        let (rest, _) = tag("*").parse(input)?;
        let star = NodeBuilder::new(NodeKind::ImportStar).span(range(star_start, rest));
        (
            rest,
            statement
                .node("names", star)
                .seq("relative", relative)
                .opt("lpar", None)
                .opt("rpar", None),
        )
    } else if input.fragment().starts_with('(') {
        let inner = ctx.bracket(input)?;
        let (rest, lpar) = parse_open_bracket(input, NodeKind::LeftParen, "(")?;
        let (rest, (names, whitespace, _)) =
            parse_comma_separated(rest, inner.nested, |i| parse_import_alias(i, true, false))?;
        if names.is_empty() {
            return Err(failure(rest, "expected name"));
        }
        let (rest, rpar) = expect(
            parse_close_bracket(rest, NodeKind::RightParen, ")", whitespace),
            "expected ')'",
        )?;
        (
            rest,
            statement
                .seq("names", names)
                .seq("relative", relative)
                .node("lpar", lpar)
                .node("rpar", rpar),
        )
    } else {
        let (_, (names, _, end)) =
            parse_comma_separated(input, false, |i| parse_import_alias(i, false, false))?;
        if names.is_empty() {
            return Err(failure(input, "expected name"));
        }
        (
            end,
            statement
                .seq("names", names)
                .seq("relative", relative)
                .opt("lpar", None)
                .opt("rpar", None),
        )
    };

    Ok((
        end,
        statement
            .span(range(start, end))
            .node("whitespace_after_from", whitespace_after_from)
            .node("whitespace_before_import", whitespace_before_import)
            .node("whitespace_after_import", whitespace_after_import),
    ))
}

/// 表达式语句、带注解的赋值、赋值（支持连续赋值）或增量赋值
fn parse_expression_statement(input: Span, ctx: Ctx) -> ParseResult<NodeBuilder> {
    let start = input;
    let (mut input, mut value) = parse_assign_value(input, ctx)?;

    let (after, whitespace) = parse_simple_whitespace(input)?;
    if after.fragment().starts_with(':') {
        let indicator_start = after;
        let (rest, _) = tag(":").parse(after)?;
        let (rest, whitespace_after_indicator) = parse_simple_whitespace(rest)?;
        let (rest, annotation) = expect(parse_test(rest, ctx), "expected annotation")?;
        let annotation = NodeBuilder::new(NodeKind::Annotation)
            .span(range(indicator_start, rest))
            .node("annotation", annotation)
            .node("whitespace_before_indicator", whitespace)
            .node("whitespace_after_indicator", whitespace_after_indicator)
            .scalar("indicator", ":");

        let (rest, assigned) = match parse_assign_equal(rest, false) {
            Ok((rest, equal)) => {
                let (rest, assigned) =
                    expect(parse_assign_value(rest, ctx), "expected expression")?;
                (rest, Some((equal, assigned)))
            }
            Err(nom::Err::Error(_)) => (rest, None),
            Err(err) => return Err(err),
        };
        let (equal, assigned) = assigned.unzip();

        return Ok((
            rest,
            NodeBuilder::new(NodeKind::AnnAssign)
                .span(range(start, rest))
                .node("target", value)
                .node("annotation", annotation)
                .opt("value", assigned)
                .opt("equal", equal),
        ));
    }

    let mut targets = Vec::new();
    let mut target_start = start;
    loop {
        let (rest, whitespace_before_equal) = parse_simple_whitespace(input)?;
        let fragment = *rest.fragment();
        if !fragment.starts_with('=') || fragment.starts_with("==") {
            break;
        }
        let (rest, _) = tag("=").parse(rest)?;
        let equal_end = rest;
        let (rest, whitespace_after_equal) = parse_simple_whitespace(rest)?;
        let value_start = rest;
        let (rest, next) = expect(parse_assign_value(rest, ctx), "expected expression")?;

        targets.push(
            NodeBuilder::new(NodeKind::AssignTarget)
                .span(range(target_start, equal_end))
                .node("target", value)
                .node("whitespace_before_equal", whitespace_before_equal)
                .node("whitespace_after_equal", whitespace_after_equal),
        );
        value = next;
        target_start = value_start;
        input = rest;
    }

    if targets.is_empty() {
        if let Ok((rest, (_, operator))) =
            parse_operator_token(input, false, AUGMENTED_OPERATORS)
        {
            let (rest, augmented) = expect(parse_assign_value(rest, ctx), "expected expression")?;
            return Ok((
                rest,
                NodeBuilder::new(NodeKind::AugAssign)
                    .span(range(start, rest))
                    .node("target", value)
                    .node("operator", operator)
                    .node("value", augmented),
            ));
        }
        return Ok((
            input,
            NodeBuilder::new(NodeKind::Expr)
                .span(range(start, input))
                .node("value", value),
        ));
    }

    Ok((
        input,
        NodeBuilder::new(NodeKind::Assign)
            .span(range(start, input))
            .seq("targets", targets)
            .node("value", value),
    ))
}

// ===== 复合语句 =====

/// 冒号之后的语句体：缩进块，或同一行的简单语句
fn parse_block<'a>(input: Span<'a>, ctx: Ctx, indent: &str) -> ParseResult<'a, NodeBuilder> {
    let start = input;
    let inner = ctx.block(input)?;
    let (after_whitespace, leading_whitespace) = parse_simple_whitespace(input)?;

    if !at_line_end(after_whitespace.fragment()) {
        let (input, body) = commit(parse_simple_statements(after_whitespace, inner, Vec::new()))?;
        let span = body
            .first()
            .and_then(NodeBuilder::source_span)
            .zip(body.last().and_then(NodeBuilder::source_span))
            .map(|(first, last)| first.cover(last));
        return Ok((
            input,
            NodeBuilder::new(NodeKind::SimpleStatementSuite)
                .span_opt(span)
                .seq("body", body)
                .node("leading_whitespace", leading_whitespace),
        ));
    }

    let (input, header) = parse_trailing_whitespace(input)?;
    let (peek, _) = many0(parse_empty_line).parse(input)?;
    let block_indent = leading_indent(peek.fragment());
    if peek.fragment().is_empty()
        || block_indent.len() <= indent.len()
        || !block_indent.starts_with(indent)
    {
        return Err(failure(peek, "expected an indented block"));
    }

    let (input, body) = parse_statements(input, inner, block_indent)?;
    let span = body
        .last()
        .and_then(NodeBuilder::source_span)
        .map(|last| SourceSpan::new(Position::from_span(start), last.end));

    Ok((
        input,
        NodeBuilder::new(NodeKind::IndentedBlock)
            .span_opt(span)
            .seq("body", body)
            .node("header", header)
            .scalar("indent", &block_indent[indent.len()..]),
    ))
}

/// 从关键字到语句体结束
fn compound_span(start: Span, body: &NodeBuilder) -> Option<SourceSpan> {
    body.source_span()
        .map(|body| SourceSpan::new(Position::from_span(start), body.end))
}

fn parse_colon(input: Span) -> ParseResult<Span> {
    expect(tag(":").parse(input), "expected ':'")
}

/// 同一缩进处是否紧跟着 `keyword` 子句；是则返回其前的空行，并跳过缩进
fn peek_clause<'a>(
    input: Span<'a>,
    indent: &str,
    keyword: &'static str,
) -> ParseResult<'a, Option<Vec<NodeBuilder>>> {
    let (rest, leading_lines) = many0(parse_empty_line).parse(input)?;
    if leading_indent(rest.fragment()) != indent {
        return Ok((input, None));
    }

    let (rest, _) = take(indent.len()).parse(rest)?;
    if leading_word(rest.fragment()) != keyword {
        return Ok((input, None));
    }
    Ok((rest, Some(leading_lines)))
}

/// else 分支
fn parse_orelse<'a>(
    input: Span<'a>,
    ctx: Ctx,
    indent: &str,
) -> ParseResult<'a, Option<NodeBuilder>> {
    match peek_clause(input, indent, "else")? {
        (rest, Some(leading_lines)) => {
            let (rest, node) = parse_else(rest, ctx, indent, leading_lines)?;
            Ok((rest, Some(node)))
        }
        (rest, None) => Ok((rest, None)),
    }
}

fn parse_else<'a>(
    input: Span<'a>,
    ctx: Ctx,
    indent: &str,
    leading_lines: Vec<NodeBuilder>,
) -> ParseResult<'a, NodeBuilder> {
    let start = input;
    let (input, _) = parse_keyword(input, "else")?;
    let (input, whitespace_before_colon) = parse_simple_whitespace(input)?;
    let (input, _) = parse_colon(input)?;
    let (input, body) = parse_block(input, ctx, indent)?;

    Ok((
        input,
        NodeBuilder::new(NodeKind::Else)
            .span_opt(compound_span(start, &body))
            .node("body", body)
            .seq("leading_lines", leading_lines)
            .node("whitespace_before_colon", whitespace_before_colon),
    ))
}

/// if 或 elif 子句；orelse 在整条链解析完之后接上
struct IfClause {
    span: Option<SourceSpan>,
    test: NodeBuilder,
    body: NodeBuilder,
    leading_lines: Vec<NodeBuilder>,
    whitespace_before_test: NodeBuilder,
    whitespace_after_test: NodeBuilder,
}

impl IfClause {
    fn into_node(self, orelse: Option<NodeBuilder>) -> NodeBuilder {
        NodeBuilder::new(NodeKind::If)
            .span_opt(self.span)
            .node("test", self.test)
            .node("body", self.body)
            .opt("orelse", orelse)
            .seq("leading_lines", self.leading_lines)
            .node("whitespace_before_test", self.whitespace_before_test)
            .node("whitespace_after_test", self.whitespace_after_test)
    }
}

fn parse_if_clause<'a>(
    input: Span<'a>,
    ctx: Ctx,
    indent: &str,
    leading_lines: Vec<NodeBuilder>,
    keyword: &'static str,
) -> ParseResult<'a, IfClause> {
    let start = input;
    let (input, _) = parse_keyword(input, keyword)?;
    let (input, whitespace_before_test) = parse_simple_whitespace(input)?;
    let (input, test) = expect(parse_test(input, ctx), "expected condition")?;
    let (input, whitespace_after_test) = parse_simple_whitespace(input)?;
    let (input, _) = parse_colon(input)?;
    let (input, body) = parse_block(input, ctx, indent)?;

    Ok((
        input,
        IfClause {
            span: compound_span(start, &body),
            test,
            body,
            leading_lines,
            whitespace_before_test,
            whitespace_after_test,
        },
    ))
}

/// if / elif / else；elif 链嵌套在 orelse 中
fn parse_if<'a>(
    input: Span<'a>,
    ctx: Ctx,
    indent: &str,
    leading_lines: Vec<NodeBuilder>,
) -> ParseResult<'a, NodeBuilder> {
    let (mut input, first) = parse_if_clause(input, ctx, indent, leading_lines, "if")?;

    let mut elifs = Vec::new();
    while let (rest, Some(leading_lines)) = peek_clause(input, indent, "elif")? {
        let (rest, clause) = parse_if_clause(rest, ctx, indent, leading_lines, "elif")?;
        elifs.push(clause);
        input = rest;
    }

    let (input, mut orelse) = parse_orelse(input, ctx, indent)?;
    while let Some(clause) = elifs.pop() {
        orelse = Some(clause.into_node(orelse));
    }

    Ok((input, first.into_node(orelse)))
}

fn parse_while<'a>(
    input: Span<'a>,
    ctx: Ctx,
    indent: &str,
    leading_lines: Vec<NodeBuilder>,
) -> ParseResult<'a, NodeBuilder> {
    let start = input;
    let (input, _) = parse_keyword(input, "while")?;
    let (input, whitespace_after_while) = parse_simple_whitespace(input)?;
    let (input, test) = expect(parse_test(input, ctx), "expected condition")?;
    let (input, whitespace_before_colon) = parse_simple_whitespace(input)?;
    let (input, _) = parse_colon(input)?;
    let (input, body) = parse_block(input, ctx, indent)?;
    let span = compound_span(start, &body);
    let (input, orelse) = parse_orelse(input, ctx, indent)?;

    Ok((
        input,
        NodeBuilder::new(NodeKind::While)
            .span_opt(span)
            .node("test", test)
            .node("body", body)
            .opt("orelse", orelse)
            .seq("leading_lines", leading_lines)
            .node("whitespace_after_while", whitespace_after_while)
            .node("whitespace_before_colon", whitespace_before_colon),
    ))
}

fn parse_for<'a>(
    input: Span<'a>,
    ctx: Ctx,
    indent: &str,
    leading_lines: Vec<NodeBuilder>,
) -> ParseResult<'a, NodeBuilder> {
    let start = input;
    let (input, asynchronous) = opt(|i| parse_asynchronous(i, false)).parse(input)?;
    let (input, _) = parse_keyword(input, "for")?;
    let (input, whitespace_after_for) = parse_simple_whitespace(input)?;
    let (input, target) = expect(parse_target_list(input, ctx), "expected loop target")?;
    let (input, whitespace_before_in) = parse_simple_whitespace(input)?;
    let (input, _) = expect(parse_keyword(input, "in"), "expected 'in'")?;
    let (input, whitespace_after_in) = parse_simple_whitespace(input)?;
    let (input, iter) = expect(parse_star_expressions(input, ctx), "expected iterable")?;
    let (input, whitespace_before_colon) = parse_simple_whitespace(input)?;
    let (input, _) = parse_colon(input)?;
    let (input, body) = parse_block(input, ctx, indent)?;
    let span = compound_span(start, &body);
    let (input, orelse) = parse_orelse(input, ctx, indent)?;

    Ok((
        input,
        NodeBuilder::new(NodeKind::For)
            .span_opt(span)
            .node("target", target)
            .node("iter", iter)
            .node("body", body)
            .opt("orelse", orelse)
            .opt("asynchronous", asynchronous)
            .seq("leading_lines", leading_lines)
            .node("whitespace_after_for", whitespace_after_for)
            .node("whitespace_before_in", whitespace_before_in)
            .node("whitespace_after_in", whitespace_after_in)
            .node("whitespace_before_colon", whitespace_before_colon),
    ))
}

/// except [type [as name]]:
fn parse_except_handler<'a>(
    input: Span<'a>,
    ctx: Ctx,
    indent: &str,
    leading_lines: Vec<NodeBuilder>,
) -> ParseResult<'a, NodeBuilder> {
    let start = input;
    let (input, _) = parse_keyword(input, "except")?;
    let keyword_end = input;
    let (after, whitespace) = parse_simple_whitespace(input)?;

    let (input, whitespace_after_except, handler_type, name) = match parse_test(after, ctx) {
        Ok((rest, handler_type)) => {
            let (rest, name) = opt(|i| parse_as_name(i, false, parse_name)).parse(rest)?;
            (rest, whitespace, Some(handler_type), name)
        }
        Err(nom::Err::Error(_)) => (keyword_end, empty_whitespace(keyword_end), None, None),
        Err(err) => return Err(err),
    };

    let (input, whitespace_before_colon) = parse_simple_whitespace(input)?;
    let (input, _) = parse_colon(input)?;
    let (input, body) = parse_block(input, ctx, indent)?;

    Ok((
        input,
        NodeBuilder::new(NodeKind::ExceptHandler)
            .span_opt(compound_span(start, &body))
            .node("body", body)
            .opt("type", handler_type)
            .opt("name", name)
            .seq("leading_lines", leading_lines)
            .node("whitespace_after_except", whitespace_after_except)
            .node("whitespace_before_colon", whitespace_before_colon),
    ))
}

fn parse_finally<'a>(
    input: Span<'a>,
    ctx: Ctx,
    indent: &str,
    leading_lines: Vec<NodeBuilder>,
) -> ParseResult<'a, NodeBuilder> {
    let start = input;
    let (input, _) = parse_keyword(input, "finally")?;
    let (input, whitespace_before_colon) = parse_simple_whitespace(input)?;
    let (input, _) = parse_colon(input)?;
    let (input, body) = parse_block(input, ctx, indent)?;

    Ok((
        input,
        NodeBuilder::new(NodeKind::Finally)
            .span_opt(compound_span(start, &body))
            .node("body", body)
            .seq("leading_lines", leading_lines)
            .node("whitespace_before_colon", whitespace_before_colon),
    ))
}

/// try / except / else / finally
fn parse_try<'a>(
    input: Span<'a>,
    ctx: Ctx,
    indent: &str,
    leading_lines: Vec<NodeBuilder>,
) -> ParseResult<'a, NodeBuilder> {
    let start = input;
    let (input, _) = parse_keyword(input, "try")?;
    let (input, whitespace_before_colon) = parse_simple_whitespace(input)?;
    let (input, _) = parse_colon(input)?;
    let (mut input, body) = parse_block(input, ctx, indent)?;
    let span = compound_span(start, &body);

    let mut handlers = Vec::new();
    while let (rest, Some(lines)) = peek_clause(input, indent, "except")? {
        let (rest, handler) = parse_except_handler(rest, ctx, indent, lines)?;
        handlers.push(handler);
        input = rest;
    }

    let (input, orelse) = if handlers.is_empty() {
        (input, None)
    } else {
        parse_orelse(input, ctx, indent)?
    };

    let (input, finalbody) = match peek_clause(input, indent, "finally")? {
        (rest, Some(lines)) => {
            let (rest, node) = parse_finally(rest, ctx, indent, lines)?;
            (rest, Some(node))
        }
        (rest, None) => (rest, None),
    };

    if handlers.is_empty() && finalbody.is_none() {
        return Err(failure(input, "expected 'except' or 'finally' block"));
    }

    Ok((
        input,
        NodeBuilder::new(NodeKind::Try)
            .span_opt(span)
            .node("body", body)
            .seq("handlers", handlers)
            .opt("orelse", orelse)
            .opt("finalbody", finalbody)
            .seq("leading_lines", leading_lines)
            .node("whitespace_before_colon", whitespace_before_colon),
    ))
}

fn parse_with_item(input: Span, ctx: Ctx) -> ParseResult<NodeBuilder> {
    let start = input;
    let (input, item) = parse_test(input, ctx)?;
    let (input, asname) =
        opt(|i| parse_as_name(i, ctx.nested, |j| parse_target(j, ctx))).parse(input)?;

    Ok((
        input,
        NodeBuilder::new(NodeKind::WithItem)
            .span(range(start, input))
            .node("item", item)
            .opt("asname", asname),
    ))
}

/// 带括号的 with 项列表：`with (a as b, c):`
fn parse_with_items_parenthesized(
    input: Span,
    ctx: Ctx,
) -> ParseResult<(Vec<NodeBuilder>, NodeBuilder, NodeBuilder, NodeBuilder)> {
    let inner = ctx.bracket(input)?;
    let (input, lpar) = parse_open_bracket(input, NodeKind::LeftParen, "(")?;
    let (input, (items, whitespace, _)) =
        parse_comma_separated(input, true, |i| parse_with_item(i, inner))?;
    if items.is_empty() {
        return reject(input, "expected with item");
    }
    let (input, rpar) = parse_close_bracket(input, NodeKind::RightParen, ")", whitespace)?;
    let (input, whitespace_before_colon) = parse_simple_whitespace(input)?;
    if !input.fragment().starts_with(':') {
        return reject(input, "expected ':'");
    }

    Ok((input, (items, lpar, rpar, whitespace_before_colon)))
}

fn parse_with<'a>(
    input: Span<'a>,
    ctx: Ctx,
    indent: &str,
    leading_lines: Vec<NodeBuilder>,
) -> ParseResult<'a, NodeBuilder> {
    let start = input;
    let (input, asynchronous) = opt(|i| parse_asynchronous(i, false)).parse(input)?;
    let (input, _) = parse_keyword(input, "with")?;
    let (input, whitespace_after_with) = parse_simple_whitespace(input)?;

    // 括号可能属于第一个 with 项本身，不成立时按普通列表重新解析
    let parenthesized = if input.fragment().starts_with('(') {
        match parse_with_items_parenthesized(input, ctx) {
            Ok(parsed) => Some(parsed),
            Err(nom::Err::Error(_)) => None,
            Err(err) => return Err(err),
        }
    } else {
        None
    };

    let (input, items, lpar, rpar, whitespace_before_colon) = match parenthesized {
        Some((rest, (items, lpar, rpar, whitespace_before_colon))) => {
            (rest, items, Some(lpar), Some(rpar), whitespace_before_colon)
        }
        None => {
            let (rest, (items, whitespace_before_colon, _)) =
                parse_comma_separated(input, false, |i| parse_with_item(i, ctx))?;
            if items.is_empty() {
                return Err(failure(input, "expected with item"));
            }
            (rest, items, None, None, whitespace_before_colon)
        }
    };

    let (input, _) = parse_colon(input)?;
    let (input, body) = parse_block(input, ctx, indent)?;

    Ok((
        input,
        NodeBuilder::new(NodeKind::With)
            .span_opt(compound_span(start, &body))
            .seq("items", items)
            .node("body", body)
            .opt("asynchronous", asynchronous)
            .opt("lpar", lpar)
            .opt("rpar", rpar)
            .seq("leading_lines", leading_lines)
            .node("whitespace_after_with", whitespace_after_with)
            .node("whitespace_before_colon", whitespace_before_colon),
    ))
}

/// 形参：`[*|**]name[: annotation][ = default]`，以及单独的 `*` 和 `/`
fn parse_param(input: Span, ctx: Ctx, annotated: bool) -> ParseResult<NodeBuilder> {
    let start = input;
    let fragment = *input.fragment();
    if fragment.starts_with('/') {
        let (rest, _) = tag("/").parse(input)?;
        return Ok((
            rest,
            NodeBuilder::new(NodeKind::ParamSlash).span(range(start, rest)),
        ));
    }

    let star = if fragment.starts_with("**") {
        "**"
    } else if fragment.starts_with('*') {
        "*"
    } else {
        ""
    };
    let (rest, _) = tag(star).parse(input)?;
    let star_end = rest;
    let (rest, whitespace_after_star) = parse_whitespace(rest, ctx.nested)?;

    let (rest, name) = match parse_name(rest) {
        Ok(parsed) => parsed,
        // 单独的 *：之后的参数只能按关键字传递
        Err(nom::Err::Error(_)) if star == "*" => {
            return Ok((
                star_end,
                NodeBuilder::new(NodeKind::ParamStar).span(range(start, star_end)),
            ));
        }
        Err(err) => return Err(err),
    };

    let (rest, annotation) = if annotated {
        opt(|i| parse_param_annotation(i, ctx)).parse(rest)?
    } else {
        (rest, None)
    };
    let (rest, default) = opt(|i| parse_param_default(i, ctx)).parse(rest)?;
    let (equal, default) = default.unzip();

    Ok((
        rest,
        NodeBuilder::new(NodeKind::Param)
            .span(range(start, rest))
            .node("name", name)
            .opt("annotation", annotation)
            .opt("equal", equal)
            .opt("default", default)
            .scalar("star", star)
            .node("whitespace_after_star", whitespace_after_star),
    ))
}

fn parse_param_annotation(input: Span, ctx: Ctx) -> ParseResult<NodeBuilder> {
    let (input, whitespace_before_indicator) = parse_whitespace(input, ctx.nested)?;
    let start = input;
    let (input, _) = char(':').parse(input)?;
    let (input, whitespace_after_indicator) = parse_whitespace(input, ctx.nested)?;
    let (input, annotation) = expect(parse_test(input, ctx), "expected annotation")?;

    Ok((
        input,
        NodeBuilder::new(NodeKind::Annotation)
            .span(range(start, input))
            .node("annotation", annotation)
            .node("whitespace_before_indicator", whitespace_before_indicator)
            .node("whitespace_after_indicator", whitespace_after_indicator)
            .scalar("indicator", ":"),
    ))
}

fn parse_param_default(input: Span, ctx: Ctx) -> ParseResult<(NodeBuilder, NodeBuilder)> {
    let (input, equal) = parse_assign_equal(input, ctx.nested)?;
    let (input, default) = expect(parse_test(input, ctx), "expected default value")?;
    Ok((input, (equal, default)))
}

fn parse_parameters(input: Span, ctx: Ctx) -> ParseResult<NodeBuilder> {
    let start = input;
    let inner = ctx.bracket(input)?;
    let (input, lpar) = expect(
        parse_open_bracket(input, NodeKind::LeftParen, "("),
        "expected '('",
    )?;
    let (input, (params, whitespace, _)) =
        parse_comma_separated(input, true, |i| parse_param(i, inner, true))?;
    let (input, rpar) = expect(
        parse_close_bracket(input, NodeKind::RightParen, ")", whitespace),
        "expected ')'",
    )?;

    Ok((
        input,
        NodeBuilder::new(NodeKind::Parameters)
            .span(range(start, input))
            .seq("params", params)
            .node("lpar", lpar)
            .node("rpar", rpar),
    ))
}

/// 函数或类定义之前的装饰器
#[derive(Default)]
struct Decorated {
    /// 第一个装饰器的位置
    start: Option<Position>,
    decorators: Vec<NodeBuilder>,
    lines_after_decorators: Vec<NodeBuilder>,
}

impl Decorated {
    /// 有装饰器时，定义的范围从第一个 `@` 开始
    fn span(&self, start: Span, body: &NodeBuilder) -> Option<SourceSpan> {
        compound_span(start, body).map(|span| SourceSpan {
            start: self.start.unwrap_or(span.start),
            ..span
        })
    }
}

fn parse_decorator(
    input: Span,
    ctx: Ctx,
    leading_lines: Vec<NodeBuilder>,
) -> ParseResult<NodeBuilder> {
    let start = input;
    let (input, _) = tag("@").parse(input)?;
    let (input, whitespace_after_at) = parse_simple_whitespace(input)?;
    let (input, decorator) = expect(parse_test(input, ctx), "expected decorator expression")?;
    let end = input;
    let (input, trailing_whitespace) = parse_statement_end(input)?;

    Ok((
        input,
        NodeBuilder::new(NodeKind::Decorator)
            .span(range(start, end))
            .node("decorator", decorator)
            .seq("leading_lines", leading_lines)
            .node("whitespace_after_at", whitespace_after_at)
            .node("trailing_whitespace", trailing_whitespace),
    ))
}

/// 一串装饰器以及其后的函数或类定义
fn parse_decorated<'a>(
    input: Span<'a>,
    ctx: Ctx,
    indent: &str,
    leading_lines: Vec<NodeBuilder>,
) -> ParseResult<'a, NodeBuilder> {
    let mut decorated = Decorated {
        start: Some(Position::from_span(input)),
        ..Decorated::default()
    };
    let mut input = input;
    let mut lines = Vec::new();

    loop {
        let (rest, decorator) = parse_decorator(input, ctx, lines)?;
        decorated.decorators.push(decorator);

        let (rest, empty_lines) = many0(parse_empty_line).parse(rest)?;
        if leading_indent(rest.fragment()) != indent {
            return Err(failure(rest, "expected function or class definition"));
        }
        let (rest, _) = take(indent.len()).parse(rest)?;
        if rest.fragment().starts_with('@') {
            lines = empty_lines;
            input = rest;
            continue;
        }

        decorated.lines_after_decorators = empty_lines;
        let fragment = *rest.fragment();
        return match leading_word(fragment) {
            "def" => parse_function_def(rest, ctx, indent, leading_lines, decorated),
            "async" if word_after(fragment, "async") == "def" => {
                parse_function_def(rest, ctx, indent, leading_lines, decorated)
            }
            "class" => parse_class_def(rest, ctx, indent, leading_lines, decorated),
            _ => Err(failure(rest, "expected function or class definition")),
        };
    }
}

fn parse_function_def<'a>(
    input: Span<'a>,
    ctx: Ctx,
    indent: &str,
    leading_lines: Vec<NodeBuilder>,
    decorated: Decorated,
) -> ParseResult<'a, NodeBuilder> {
    let start = input;
    let (input, asynchronous) = opt(|i| parse_asynchronous(i, false)).parse(input)?;
    let (input, _) = parse_keyword(input, "def")?;
    let (input, whitespace_after_def) = parse_simple_whitespace(input)?;
    let (input, name) = expect(parse_name(input), "expected function name")?;
    let (input, whitespace_after_name) = parse_simple_whitespace(input)?;
    let (input, params) = parse_parameters(input, ctx)?;
    let (after_params, whitespace) = parse_simple_whitespace(input)?;

    // 返回值注解 -> expr
    let (input, returns, whitespace_before_colon) = if after_params.fragment().starts_with("->")
    {
        let indicator_start = after_params;
        let (rest, _) = tag("->").parse(after_params)?;
        let (rest, whitespace_after_indicator) = parse_simple_whitespace(rest)?;
        let (rest, annotation) = expect(parse_test(rest, ctx), "expected return annotation")?;
        let returns = NodeBuilder::new(NodeKind::Annotation)
            .span(range(indicator_start, rest))
            .node("annotation", annotation)
            .node("whitespace_before_indicator", whitespace)
            .node("whitespace_after_indicator", whitespace_after_indicator)
            .scalar("indicator", "->");
        let (rest, whitespace_before_colon) = parse_simple_whitespace(rest)?;
        (rest, Some(returns), whitespace_before_colon)
    } else {
        (after_params, None, whitespace)
    };

    let (input, _) = parse_colon(input)?;
    let (input, body) = parse_block(input, ctx, indent)?;

    Ok((
        input,
        NodeBuilder::new(NodeKind::FunctionDef)
            .span_opt(decorated.span(start, &body))
            .node("name", name)
            .node("params", params)
            .node("body", body)
            .seq("decorators", decorated.decorators)
            .opt("returns", returns)
            .opt("asynchronous", asynchronous)
            .seq("leading_lines", leading_lines)
            .seq("lines_after_decorators", decorated.lines_after_decorators)
            .node("whitespace_after_def", whitespace_after_def)
            .node("whitespace_after_name", whitespace_after_name)
            .node("whitespace_before_colon", whitespace_before_colon),
    ))
}

fn parse_class_def<'a>(
    input: Span<'a>,
    ctx: Ctx,
    indent: &str,
    leading_lines: Vec<NodeBuilder>,
    decorated: Decorated,
) -> ParseResult<'a, NodeBuilder> {
    let start = input;
    let (input, _) = parse_keyword(input, "class")?;
    let (input, whitespace_after_class) = parse_simple_whitespace(input)?;
    let (input, name) = expect(parse_name(input), "expected class name")?;
    let name_end = input;
    let (after_name, whitespace) = parse_simple_whitespace(input)?;

    let (input, whitespace_after_name, bases, lpar, rpar, whitespace_before_colon) =
        if after_name.fragment().starts_with('(') {
            let inner = ctx.bracket(after_name)?;
            let (rest, lpar) = parse_open_bracket(after_name, NodeKind::LeftParen, "(")?;
            let (rest, (bases, whitespace_before_rpar, _)) =
                parse_comma_separated(rest, true, |i| parse_arg(i, inner))?;
            let (rest, rpar) = expect(
                parse_close_bracket(rest, NodeKind::RightParen, ")", whitespace_before_rpar),
                "expected ')'",
            )?;
            let (rest, whitespace_before_colon) = parse_simple_whitespace(rest)?;
            (rest, whitespace, bases, Some(lpar), Some(rpar), whitespace_before_colon)
        } else {
            let whitespace_after_name = empty_whitespace(name_end);
            (after_name, whitespace_after_name, Vec::new(), None, None, whitespace)
        };

    let (input, _) = parse_colon(input)?;
    let (input, body) = parse_block(input, ctx, indent)?;

    Ok((
        input,
        NodeBuilder::new(NodeKind::ClassDef)
            .span_opt(decorated.span(start, &body))
            .node("name", name)
            .node("body", body)
            .seq("bases", bases)
            .seq("decorators", decorated.decorators)
            .opt("lpar", lpar)
            .opt("rpar", rpar)
            .seq("leading_lines", leading_lines)
            .seq("lines_after_decorators", decorated.lines_after_decorators)
            .node("whitespace_after_class", whitespace_after_class)
            .node("whitespace_after_name", whitespace_after_name)
            .node("whitespace_before_colon", whitespace_before_colon),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cst::tree::{FieldValue, NodeIdx, SyntaxTree};

    fn span(l1: usize, c1: usize, l2: usize, c2: usize) -> SourceSpan {
        SourceSpan::new(Position::new(l1, c1), Position::new(l2, c2))
    }

    fn first_statement(tree: &Tree) -> NodeIdx {
        tree.children(tree.root(), "body")[0]
    }

    fn first_value(tree: &Tree) -> NodeIdx {
        tree.child(first_statement(tree), "value").unwrap()
    }

    #[test]
    fn test_parse_assign() {
        let tree = parse_module("x = 1\n").unwrap();
        let assign = first_statement(&tree);
        assert_eq!(tree.kind(assign), NodeKind::Assign);
        assert_eq!(tree.span(assign), Some(span(1, 0, 1, 5)));

        let target = tree.children(assign, "targets")[0];
        assert_eq!(tree.kind(target), NodeKind::AssignTarget);
        assert_eq!(tree.span(target), Some(span(1, 0, 1, 3)));

        let name = tree.child(target, "target").unwrap();
        assert_eq!(tree.str_value(name, "value"), Some("x"));
        assert_eq!(tree.span(name), Some(span(1, 0, 1, 1)));

        let value = tree.child(assign, "value").unwrap();
        assert_eq!(tree.kind(value), NodeKind::Integer);
        assert_eq!(tree.span(value), Some(span(1, 4, 1, 5)));

        assert_eq!(tree.scalar(assign, "semicolon"), Some(&Scalar::None));
        let trailing = tree.child(assign, "trailing_whitespace").unwrap();
        let newline = tree.child(trailing, "newline").unwrap();
        assert_eq!(tree.scalar(newline, "value"), Some(&Scalar::None));
        assert_eq!(tree.span(tree.root()), None);
    }

    #[test]
    fn test_parse_chained_assign() {
        let tree = parse_module("a = b = 2\n").unwrap();
        let assign = first_statement(&tree);
        let targets = tree.children(assign, "targets");
        assert_eq!(targets.len(), 2);
        assert_eq!(tree.span(targets[1]), Some(span(1, 4, 1, 7)));
    }

    #[test]
    fn test_parse_aug_assign() {
        let tree = parse_module("total += 2 * x\nbits >>= 1\n").unwrap();
        let body = tree.children(tree.root(), "body");
        assert_eq!(tree.kind(body[0]), NodeKind::AugAssign);
        let operator = tree.child(body[0], "operator").unwrap();
        assert_eq!(tree.kind(operator), NodeKind::AddAssign);
        let value = tree.child(body[0], "value").unwrap();
        assert_eq!(tree.kind(value), NodeKind::BinaryOperation);

        let operator = tree.child(body[1], "operator").unwrap();
        assert_eq!(tree.kind(operator), NodeKind::RightShiftAssign);
    }

    #[test]
    fn test_parse_ann_assign() {
        let tree = parse_module("count: int = 0\nname: str\n").unwrap();
        let body = tree.children(tree.root(), "body");
        assert_eq!(tree.kind(body[0]), NodeKind::AnnAssign);
        let annotation = tree.child(body[0], "annotation").unwrap();
        assert_eq!(tree.str_value(annotation, "indicator"), Some(":"));
        assert!(tree.child(body[0], "equal").is_some());
        assert!(tree.child(body[1], "value").is_none());
    }

    #[test]
    fn test_operator_precedence() {
        let tree = parse_module("1 + 2 * 3 ** -4\n").unwrap();
        let expr = first_value(&tree);
        assert_eq!(tree.kind(expr), NodeKind::BinaryOperation);
        assert_eq!(
            tree.kind(tree.child(expr, "operator").unwrap()),
            NodeKind::Add
        );

        let right = tree.child(expr, "right").unwrap();
        assert_eq!(
            tree.kind(tree.child(right, "operator").unwrap()),
            NodeKind::Multiply
        );
        let power = tree.child(right, "right").unwrap();
        assert_eq!(
            tree.kind(tree.child(power, "operator").unwrap()),
            NodeKind::Power
        );
        let exponent = tree.child(power, "right").unwrap();
        assert_eq!(tree.kind(exponent), NodeKind::UnaryOperation);
    }

    #[test]
    fn test_binary_operators_associate_left_and_power_right() {
        let tree = parse_module("a - b - c\nx ** y ** z\n").unwrap();
        let body = tree.children(tree.root(), "body");

        let difference = tree.child(body[0], "value").unwrap();
        let left = tree.child(difference, "left").unwrap();
        assert_eq!(tree.kind(left), NodeKind::BinaryOperation);
        assert_eq!(tree.span(left), Some(span(1, 0, 1, 5)));

        let power = tree.child(body[1], "value").unwrap();
        assert_eq!(tree.kind(tree.child(power, "left").unwrap()), NodeKind::Name);
        let right = tree.child(power, "right").unwrap();
        assert_eq!(tree.kind(right), NodeKind::BinaryOperation);
    }

    #[test]
    fn test_parse_comparison_chain() {
        let tree = parse_module("a < b not in c is not d\n").unwrap();
        let comparison = first_value(&tree);
        assert_eq!(tree.kind(comparison), NodeKind::Comparison);

        let operators: Vec<_> = tree
            .children(comparison, "comparisons")
            .iter()
            .map(|&target| tree.kind(tree.child(target, "operator").unwrap()))
            .collect();
        assert_eq!(
            operators,
            [NodeKind::LessThan, NodeKind::NotIn, NodeKind::IsNot]
        );
    }

    #[test]
    fn test_keywords_are_not_names() {
        let tree = parse_module("notice = not x or y\n").unwrap();
        let value = first_value(&tree);
        assert_eq!(tree.kind(value), NodeKind::BooleanOperation);
        let left = tree.child(value, "left").unwrap();
        assert_eq!(tree.kind(left), NodeKind::UnaryOperation);
    }

    #[test]
    fn test_parse_if_expression_and_lambda() {
        let tree = parse_module("f = lambda x, *rest: x if x else rest\n").unwrap();
        let lambda = first_value(&tree);
        assert_eq!(tree.kind(lambda), NodeKind::Lambda);

        let params = tree.child(lambda, "params").unwrap();
        let names: Vec<_> = tree
            .children(params, "params")
            .iter()
            .map(|&param| tree.str_value(param, "star").unwrap())
            .collect();
        assert_eq!(names, ["", "*"]);
        assert_eq!(tree.scalar(params, "lpar"), Some(&Scalar::None));

        let body = tree.child(lambda, "body").unwrap();
        assert_eq!(tree.kind(body), NodeKind::IfExp);
        assert_eq!(tree.span(body), Some(span(1, 21, 1, 37)));
    }

    #[test]
    fn test_parse_call_with_keyword_args() {
        let tree = parse_module("print(a, sep = '-')\n").unwrap();
        let call = first_value(&tree);
        assert_eq!(tree.kind(call), NodeKind::Call);

        let args = tree.children(call, "args");
        assert_eq!(args.len(), 2);
        assert!(tree.child(args[0], "comma").is_some());
        let keyword = tree.child(args[1], "keyword").unwrap();
        assert_eq!(tree.str_value(keyword, "value"), Some("sep"));
        let value = tree.child(args[1], "value").unwrap();
        assert_eq!(tree.str_value(value, "value"), Some("'-'"));
    }

    #[test]
    fn test_parse_star_args() {
        let tree = parse_module("f(*args, **kwargs, key=1)\n").unwrap();
        let call = first_value(&tree);
        let stars: Vec<_> = tree
            .children(call, "args")
            .iter()
            .map(|&arg| tree.str_value(arg, "star").unwrap())
            .collect();
        assert_eq!(stars, ["*", "**", ""]);
    }

    #[test]
    fn test_parse_attribute_and_subscript() {
        let tree = parse_module("os.path[0].join\n").unwrap();
        let attribute = first_value(&tree);
        assert_eq!(tree.kind(attribute), NodeKind::Attribute);
        let subscript = tree.child(attribute, "value").unwrap();
        assert_eq!(tree.kind(subscript), NodeKind::Subscript);
        assert_eq!(tree.span(subscript), Some(span(1, 0, 1, 10)));

        let element = tree.children(subscript, "slice")[0];
        let index = tree.child(element, "slice").unwrap();
        assert_eq!(tree.kind(index), NodeKind::Index);
    }

    #[test]
    fn test_parse_slices() {
        let tree = parse_module("a[1:2, ::3, :]\n").unwrap();
        let subscript = first_value(&tree);
        let slices: Vec<_> = tree
            .children(subscript, "slice")
            .iter()
            .map(|&element| tree.child(element, "slice").unwrap())
            .collect();
        assert_eq!(slices.len(), 3);
        assert!(slices.iter().all(|&slice| tree.kind(slice) == NodeKind::Slice));

        assert!(tree.child(slices[0], "lower").is_some());
        assert!(tree.child(slices[0], "second_colon").is_none());
        assert!(tree.child(slices[1], "lower").is_none());
        assert!(tree.child(slices[1], "step").is_some());
        assert_eq!(tree.span(slices[1]), Some(span(1, 7, 1, 10)));
        assert_eq!(tree.span(slices[2]), Some(span(1, 12, 1, 13)));
    }

    #[test]
    fn test_parse_collections() {
        let tree = parse_module("[1, (2,), {'a': 3.5}, (), {1, 2}, 1j]\n").unwrap();
        let list = first_value(&tree);
        assert_eq!(tree.kind(list), NodeKind::List);

        let kinds: Vec<_> = tree
            .children(list, "elements")
            .iter()
            .map(|&element| tree.kind(tree.child(element, "value").unwrap()))
            .collect();
        assert_eq!(
            kinds,
            [
                NodeKind::Integer,
                NodeKind::Tuple,
                NodeKind::Dict,
                NodeKind::Tuple,
                NodeKind::Set,
                NodeKind::Imaginary,
            ]
        );
    }

    #[test]
    fn test_parse_comprehensions() {
        let source = "r = [x for x in y if x], {k: v for k, v in d}, {s for s in t}, (g for g in h)\n";
        let tree = parse_module(source).unwrap();
        let tuple = first_value(&tree);
        assert_eq!(tree.scalar(tuple, "lpar"), Some(&Scalar::None));

        let kinds: Vec<_> = tree
            .children(tuple, "elements")
            .iter()
            .map(|&element| tree.kind(tree.child(element, "value").unwrap()))
            .collect();
        assert_eq!(
            kinds,
            [
                NodeKind::ListComp,
                NodeKind::DictComp,
                NodeKind::SetComp,
                NodeKind::GeneratorExp
            ]
        );

        let list_comp = tree.child(tree.children(tuple, "elements")[0], "value").unwrap();
        let for_in = tree.child(list_comp, "for_in").unwrap();
        assert_eq!(tree.children(for_in, "ifs").len(), 1);
        assert_eq!(tree.span(for_in), Some(span(1, 7, 1, 22)));
    }

    #[test]
    fn test_nested_comprehension_clauses() {
        let tree = parse_module("[a for b in c for a in b]\n").unwrap();
        let for_in = tree.child(first_value(&tree), "for_in").unwrap();
        let inner = tree.child(for_in, "inner_for_in").unwrap();
        assert_eq!(tree.kind(inner), NodeKind::CompFor);
        assert!(tree.child(inner, "inner_for_in").is_none());
        assert_eq!(tree.span(inner), Some(span(1, 14, 1, 24)));
    }

    #[test]
    fn test_parse_strings() {
        let tree = parse_module("s = r'a\\'b' + \"\"\"x\ny\"\"\"\n").unwrap();
        let value = first_value(&tree);
        let left = tree.child(value, "left").unwrap();
        assert_eq!(tree.str_value(left, "value"), Some("r'a\\'b'"));
        let right = tree.child(value, "right").unwrap();
        assert_eq!(tree.span(right), Some(span(1, 14, 2, 4)));
    }

    #[test]
    fn test_adjacent_strings_concatenate() {
        let tree = parse_module("s = ('a'\n     b'b' \"c\")\n").unwrap();
        let parenthesized = first_value(&tree);
        let outer = tree.child(parenthesized, "value").unwrap();
        assert_eq!(tree.kind(outer), NodeKind::ConcatenatedString);
        assert_eq!(tree.span(outer), Some(span(1, 5, 2, 13)));

        let inner = tree.child(outer, "right").unwrap();
        assert_eq!(tree.kind(inner), NodeKind::ConcatenatedString);
        let between = tree.child(outer, "whitespace_between").unwrap();
        assert_eq!(tree.kind(between), NodeKind::ParenthesizedWhitespace);
    }

    #[test]
    fn test_parse_function_def() {
        let source = "def main(arg: None|str = None) -> int :\n    return 42\n";
        let tree = parse_module(source).unwrap();
        let function = first_statement(&tree);
        assert_eq!(tree.kind(function), NodeKind::FunctionDef);
        assert_eq!(tree.span(function), Some(span(1, 0, 2, 13)));

        let params = tree.child(function, "params").unwrap();
        let param = tree.children(params, "params")[0];
        let annotation = tree.child(param, "annotation").unwrap();
        assert_eq!(
            tree.kind(tree.child(annotation, "annotation").unwrap()),
            NodeKind::BinaryOperation
        );
        assert!(tree.child(param, "default").is_some());

        let returns = tree.child(function, "returns").unwrap();
        assert_eq!(tree.str_value(returns, "indicator"), Some("->"));

        let body = tree.child(function, "body").unwrap();
        assert_eq!(tree.kind(body), NodeKind::IndentedBlock);
        assert_eq!(tree.str_value(body, "indent"), Some("    "));
        let statement = tree.children(body, "body")[0];
        assert_eq!(tree.kind(statement), NodeKind::Return);
        assert_eq!(tree.span(statement), Some(span(2, 4, 2, 13)));
    }

    #[test]
    fn test_parse_special_parameters() {
        let tree = parse_module("def f(a, /, b, *, c, **kw): pass\n").unwrap();
        let params = tree.child(first_statement(&tree), "params").unwrap();
        let kinds: Vec<_> = tree
            .children(params, "params")
            .iter()
            .map(|&param| tree.kind(param))
            .collect();
        assert_eq!(
            kinds,
            [
                NodeKind::Param,
                NodeKind::ParamSlash,
                NodeKind::Param,
                NodeKind::ParamStar,
                NodeKind::Param,
                NodeKind::Param
            ]
        );
    }

    #[test]
    fn test_parse_decorated_async_def() {
        let source = "# lead\n@first\n\n@second(1)\nasync def run():\n    await go()\n";
        let tree = parse_module(source).unwrap();
        let function = first_statement(&tree);
        assert_eq!(tree.kind(function), NodeKind::FunctionDef);
        assert_eq!(tree.span(function), Some(span(2, 0, 6, 14)));
        assert!(tree.child(function, "asynchronous").is_some());

        let decorators = tree.children(function, "decorators");
        assert_eq!(decorators.len(), 2);
        assert_eq!(tree.children(decorators[1], "leading_lines").len(), 1);
        assert_eq!(tree.span(decorators[1]), Some(span(4, 0, 4, 10)));

        let body = tree.child(function, "body").unwrap();
        let statement = tree.children(body, "body")[0];
        assert_eq!(tree.kind(tree.child(statement, "value").unwrap()), NodeKind::Await);
    }

    #[test]
    fn test_parse_if_elif_else() {
        let source = "if a:\n    pass\nelif b:\n    pass\n\nelse: x = 1\n";
        let tree = parse_module(source).unwrap();
        let statement = first_statement(&tree);
        assert_eq!(tree.kind(statement), NodeKind::If);
        assert_eq!(tree.span(statement), Some(span(1, 0, 2, 8)));

        let elif = tree.child(statement, "orelse").unwrap();
        assert_eq!(tree.kind(elif), NodeKind::If);
        let orelse = tree.child(elif, "orelse").unwrap();
        assert_eq!(tree.kind(orelse), NodeKind::Else);
        assert_eq!(tree.children(orelse, "leading_lines").len(), 1);

        let suite = tree.child(orelse, "body").unwrap();
        assert_eq!(tree.kind(suite), NodeKind::SimpleStatementSuite);
        assert_eq!(tree.span(suite), Some(span(6, 6, 6, 11)));
    }

    #[test]
    fn test_parse_nested_blocks_and_dedent() {
        let source = "for i in range(3):\n  while i:\n    i -= 1\n  else:\n    break\nprint(i)\n";
        let tree = parse_module(source).unwrap();
        let body = tree.children(tree.root(), "body");
        assert_eq!(body.len(), 2);
        assert_eq!(tree.kind(body[0]), NodeKind::For);
        assert_eq!(tree.kind(body[1]), NodeKind::Expr);

        let block = tree.child(body[0], "body").unwrap();
        let inner = tree.children(block, "body")[0];
        assert_eq!(tree.kind(inner), NodeKind::While);
        assert_eq!(tree.kind(tree.child(inner, "orelse").unwrap()), NodeKind::Else);
    }

    #[test]
    fn test_parse_try_statement() {
        let source = "try:\n    run()\nexcept (A, B) as e:\n    pass\nexcept:\n    raise\nelse:\n    ok()\nfinally:\n    done()\n";
        let tree = parse_module(source).unwrap();
        let statement = first_statement(&tree);
        assert_eq!(tree.kind(statement), NodeKind::Try);
        assert_eq!(tree.span(statement), Some(span(1, 0, 2, 9)));

        let handlers = tree.children(statement, "handlers");
        assert_eq!(handlers.len(), 2);
        let name = tree.child(handlers[0], "name").unwrap();
        assert_eq!(tree.kind(name), NodeKind::AsName);
        assert!(tree.child(handlers[1], "type").is_none());
        assert!(tree.child(statement, "orelse").is_some());
        assert_eq!(
            tree.kind(tree.child(statement, "finalbody").unwrap()),
            NodeKind::Finally
        );
    }

    #[test]
    fn test_parse_with_statement() {
        let source = "with open(p) as f, lock:\n    pass\nwith (a as b,\n      c):\n    pass\n";
        let tree = parse_module(source).unwrap();
        let body = tree.children(tree.root(), "body");

        let items = tree.children(body[0], "items");
        assert_eq!(items.len(), 2);
        assert!(tree.child(items[0], "asname").is_some());
        assert!(tree.child(body[0], "lpar").is_none());

        assert_eq!(tree.children(body[1], "items").len(), 2);
        assert!(tree.child(body[1], "lpar").is_some());
    }

    #[test]
    fn test_parenthesized_with_item_is_an_expression() {
        let tree = parse_module("with (a, b) as c:\n    pass\n").unwrap();
        let statement = first_statement(&tree);
        assert!(tree.child(statement, "lpar").is_none());
        let item = tree.children(statement, "items")[0];
        assert_eq!(tree.kind(tree.child(item, "item").unwrap()), NodeKind::Tuple);
    }

    #[test]
    fn test_parse_class_and_import() {
        let source = "import os.path as p, sys\nclass A(Base, metaclass=M):\n    pass\n";
        let tree = parse_module(source).unwrap();
        let body = tree.children(tree.root(), "body");

        let names = tree.children(body[0], "names");
        assert_eq!(names.len(), 2);
        assert!(tree.child(names[0], "asname").is_some());

        assert_eq!(tree.kind(body[1]), NodeKind::ClassDef);
        assert_eq!(tree.children(body[1], "bases").len(), 2);
    }

    #[test]
    fn test_parse_from_imports() {
        let source = "from . import a\nfrom ..pkg.mod import (b as c,\n    d,)\nfrom os import *\n";
        let tree = parse_module(source).unwrap();
        let body = tree.children(tree.root(), "body");

        assert_eq!(tree.children(body[0], "relative").len(), 1);
        assert!(tree.child(body[0], "module").is_none());

        assert_eq!(tree.children(body[1], "relative").len(), 2);
        assert_eq!(tree.kind(tree.child(body[1], "module").unwrap()), NodeKind::Attribute);
        assert_eq!(tree.children(body[1], "names").len(), 2);

        let star = tree.child(body[2], "names").unwrap();
        assert_eq!(tree.kind(star), NodeKind::ImportStar);
    }

    #[test]
    fn test_parse_small_statements() {
        let source = "raise E from err\ndel a[0], b\nassert x, 'msg'\nglobal g, h\nnonlocal n\n";
        let tree = parse_module(source).unwrap();
        let body = tree.children(tree.root(), "body");
        let kinds: Vec<_> = body.iter().map(|&statement| tree.kind(statement)).collect();
        assert_eq!(
            kinds,
            [
                NodeKind::Raise,
                NodeKind::Del,
                NodeKind::Assert,
                NodeKind::Global,
                NodeKind::Nonlocal
            ]
        );

        let cause = tree.child(body[0], "cause").unwrap();
        assert_eq!(tree.span(cause), Some(span(1, 8, 1, 16)));
        assert_eq!(tree.kind(tree.child(body[1], "target").unwrap()), NodeKind::Tuple);
        assert!(tree.child(body[2], "msg").is_some());
        assert_eq!(tree.children(body[3], "names").len(), 2);
    }

    #[test]
    fn test_semicolons_split_statements() {
        let tree = parse_module("a = 1; b = 2;  # both\nc\n").unwrap();
        let body = tree.children(tree.root(), "body");
        assert_eq!(body.len(), 3);

        assert!(tree.child(body[0], "semicolon").is_some());
        assert_eq!(tree.scalar(body[0], "trailing_whitespace"), Some(&Scalar::None));
        assert_eq!(tree.span(body[1]), Some(span(1, 7, 1, 12)));

        let semicolon = tree.child(body[1], "semicolon").unwrap();
        assert_eq!(tree.kind(semicolon), NodeKind::Semicolon);
        let trailing = tree.child(body[1], "trailing_whitespace").unwrap();
        assert!(tree.child(trailing, "comment").is_some());
        assert_eq!(tree.scalar(body[2], "semicolon"), Some(&Scalar::None));
    }

    #[test]
    fn test_header_and_footer_lines() {
        let tree = parse_module("# header\n\nx\n\n# footer\n").unwrap();
        let root = tree.root();
        assert_eq!(tree.children(root, "header").len(), 2);
        assert_eq!(tree.children(root, "footer").len(), 2);

        let comment_line = tree.children(root, "header")[0];
        let comment = tree.child(comment_line, "comment").unwrap();
        assert_eq!(tree.str_value(comment, "value"), Some("# header"));
    }

    #[test]
    fn test_whitespace_inside_brackets_spans_lines() {
        let tree = parse_module("f(a,\n  b)\n").unwrap();
        let call = first_value(&tree);
        let args = tree.children(call, "args");
        let comma = tree.child(args[0], "comma").unwrap();
        let whitespace = tree.child(comma, "whitespace_after").unwrap();
        assert_eq!(tree.kind(whitespace), NodeKind::ParenthesizedWhitespace);

        let last_line = tree.child(whitespace, "last_line").unwrap();
        assert!(matches!(
            tree.field(last_line, "value"),
            Some(FieldValue::Scalar(Scalar::Str(value))) if value == "  "
        ));
    }

    #[test]
    fn test_comments_inside_brackets() {
        let tree = parse_module("x = [1,\n  # c\n\n  2]\n").unwrap();
        let list = first_value(&tree);
        let first = tree.children(list, "elements")[0];
        let comma = tree.child(first, "comma").unwrap();
        let whitespace = tree.child(comma, "whitespace_after").unwrap();

        let empty_lines = tree.children(whitespace, "empty_lines");
        assert_eq!(empty_lines.len(), 2);
        let comment = tree.child(empty_lines[0], "comment").unwrap();
        assert_eq!(tree.str_value(comment, "value"), Some("# c"));
        assert_eq!(tree.span(whitespace), Some(span(1, 7, 4, 2)));
    }

    #[test]
    fn test_missing_trailing_newline() {
        let tree = parse_module("pass").unwrap();
        let statement = first_statement(&tree);
        let trailing = tree.child(statement, "trailing_whitespace").unwrap();
        let newline = tree.child(trailing, "newline").unwrap();
        assert_eq!(tree.str_value(newline, "value"), Some(""));
    }

    #[test]
    fn test_module_defaults() {
        let tree = parse_module("if x:\n\tpass\r\n").unwrap();
        let root = tree.root();
        assert_eq!(tree.str_value(root, "default_indent"), Some("\t"));
        assert_eq!(tree.str_value(root, "default_newline"), Some("\n"));
    }

    #[test]
    fn test_parse_errors() {
        let error = parse_module("x = (1\n").unwrap_err();
        assert_eq!(error.line, 2);

        let error = parse_module("x = 1 2\n").unwrap_err();
        assert_eq!((error.line, error.column), (1, 6));
        assert_eq!(error.message, "invalid syntax");

        let error = parse_module("x = 1\n  y = 2\n").unwrap_err();
        assert_eq!((error.line, error.column), (2, 0));
        assert_eq!(error.message, "unexpected indent");

        let error = parse_module("if x:\ny\n").unwrap_err();
        assert_eq!(error.message, "expected an indented block");

        let error = parse_module("s = 'abc\n").unwrap_err();
        assert_eq!(error.message, "unterminated string literal");

        let error = parse_module("try:\n    pass\nx = 1\n").unwrap_err();
        assert_eq!(error.message, "expected 'except' or 'finally' block");

        let error = parse_module("*a\n").unwrap_err();
        assert_eq!(error.message, "cannot use starred expression here");

        let error = parse_module("y = a if b\n").unwrap_err();
        assert_eq!(error.message, "expected 'else'");
    }

    /// 调试构建的栈帧比发布构建大得多，深层嵌套的用例在独立线程上运行
    fn with_stack<T: Send + 'static>(f: impl FnOnce() -> T + Send + 'static) -> T {
        std::thread::Builder::new()
            .stack_size(32 << 20)
            .spawn(f)
            .unwrap()
            .join()
            .unwrap()
    }

    #[test]
    fn test_deeply_nested_parentheses_are_rejected() {
        with_stack(|| {
            let source = format!("x = {}1{}\n", "(".repeat(1000), ")".repeat(1000));
            let error = parse_module(&source).unwrap_err();
            assert_eq!(error.message, "too many nested parentheses");
            assert_eq!(error.line, 1);

            let source = format!("x = {}1{}\n", "[".repeat(1000), "]".repeat(1000));
            let error = parse_module(&source).unwrap_err();
            assert_eq!(error.message, "too many nested parentheses");
        });
    }

    #[test]
    fn test_moderate_nesting_is_accepted() {
        with_stack(|| {
            let source = format!("x = {}1{}\n", "(".repeat(60), ")".repeat(60));
            let tree = parse_module(&source).unwrap();
            assert!(tree.depth().0 > 60);
        });
    }

    #[test]
    fn test_deep_prefix_operators_are_rejected() {
        with_stack(|| {
            let source = format!("x = {}1\n", "-".repeat(1000));
            let error = parse_module(&source).unwrap_err();
            assert_eq!(error.message, "expression too deeply nested");

            let source = format!("x = {}y\n", "not ".repeat(1000));
            let error = parse_module(&source).unwrap_err();
            assert_eq!(error.message, "expression too deeply nested");
        });
    }

    #[test]
    fn test_deep_blocks_are_rejected() {
        with_stack(|| {
            let source: String = (0..100)
                .map(|level| format!("{}if x:\n", " ".repeat(level)))
                .chain(std::iter::once(format!("{}pass\n", " ".repeat(100))))
                .collect();
            let error = parse_module(&source).unwrap_err();
            assert_eq!(error.message, "too many levels of indentation");
        });
    }

    #[test]
    fn test_long_operator_chain_exceeds_tree_depth() {
        with_stack(|| {
            let terms = vec!["a"; 200].join(" + ");
            let tree = parse_module(&format!("x = {}\n", terms)).unwrap();
            assert!(tree.depth().0 > 200);

            let terms = vec!["a"; 600].join(" + ");
            let error = parse_module(&format!("x = {}\n", terms)).unwrap_err();
            assert_eq!(error.message, "expression too deeply nested");
            assert_eq!(error.line, 1);
        });
    }

    #[test]
    fn test_string_body_len() {
        assert_eq!(string_body_len("abc'", "'"), Some(4));
        assert_eq!(string_body_len("a\\'b'", "'"), Some(5));
        assert_eq!(string_body_len("a\nb'''", "'''"), Some(6));
        assert_eq!(string_body_len("abc\n'", "'"), None);
    }
}
