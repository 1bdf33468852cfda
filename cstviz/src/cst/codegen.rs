/// Source regeneration from a CST
///
/// Every node emits its tokens and owned whitespace in source order, so the
/// output of a freshly parsed tree is byte-for-byte the input text. Output goes
/// through a [`TokenWriter`], which also learns what each piece of text is.

use super::kind::NodeKind;
use super::tree::{NodeIdx, Scalar, SyntaxTree, Tree};

/// 输出文本的词法类别
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenClass {
    Keyword,
    Name,
    String,
    Number,
    Comment,
    Operator,
    /// 空白、换行和缩进
    Plain,
}

/// Receives regenerated source text piece by piece.
pub trait TokenWriter {
    fn write(&mut self, class: TokenClass, text: &str);
}

impl TokenWriter for String {
    fn write(&mut self, _class: TokenClass, text: &str) {
        self.push_str(text);
    }
}

/// 单个节点的输出片段
#[derive(Debug, Clone, Copy)]
enum Part {
    /// 子节点字段（节点或序列）
    Field(&'static str),
    /// 字符串标量字段
    Value(&'static str),
    Text(&'static str),
    /// 当前缩进；同一行中 `;` 之后的语句不缩进
    Indent,
    /// 语句前导：leading_lines 和当前缩进
    Lead,
    /// 简单语句的行尾；同一行还有语句时为 None
    Trailing,
}

fn layout(kind: NodeKind) -> &'static [Part] {
    use Part::*;

    match kind {
        NodeKind::Module => &[Field("header"), Field("body"), Field("footer")],

        NodeKind::SimpleWhitespace | NodeKind::Comment => &[Value("value")],
        NodeKind::TrailingWhitespace | NodeKind::EmptyLine => {
            &[Field("whitespace"), Field("comment"), Field("newline")]
        }
        NodeKind::ParenthesizedWhitespace => {
            &[Field("first_line"), Field("empty_lines"), Field("last_line")]
        }

        NodeKind::Expr => &[Lead, Field("value"), Field("semicolon"), Trailing],
        NodeKind::Assign => &[
            Lead,
            Field("targets"),
            Field("value"),
            Field("semicolon"),
            Trailing,
        ],
        NodeKind::AssignTarget => &[
            Field("target"),
            Field("whitespace_before_equal"),
            Text("="),
            Field("whitespace_after_equal"),
        ],
        NodeKind::AnnAssign => &[
            Lead,
            Field("target"),
            Field("annotation"),
            Field("equal"),
            Field("value"),
            Field("semicolon"),
            Trailing,
        ],
        NodeKind::AugAssign => &[
            Lead,
            Field("target"),
            Field("operator"),
            Field("value"),
            Field("semicolon"),
            Trailing,
        ],
        NodeKind::Return => &[
            Lead,
            Text("return"),
            Field("whitespace_after_return"),
            Field("value"),
            Field("semicolon"),
            Trailing,
        ],
        NodeKind::Pass => &[Lead, Text("pass"), Field("semicolon"), Trailing],
        NodeKind::Break => &[Lead, Text("break"), Field("semicolon"), Trailing],
        NodeKind::Continue => &[Lead, Text("continue"), Field("semicolon"), Trailing],
        NodeKind::Raise => &[
            Lead,
            Text("raise"),
            Field("whitespace_after_raise"),
            Field("exc"),
            Field("cause"),
            Field("semicolon"),
            Trailing,
        ],
        NodeKind::From => &[
            Field("whitespace_before_from"),
            Text("from"),
            Field("whitespace_after_from"),
            Field("item"),
        ],
        NodeKind::Del => &[
            Lead,
            Text("del"),
            Field("whitespace_after_del"),
            Field("target"),
            Field("semicolon"),
            Trailing,
        ],
        NodeKind::Assert => &[
            Lead,
            Text("assert"),
            Field("whitespace_after_assert"),
            Field("test"),
            Field("comma"),
            Field("msg"),
            Field("semicolon"),
            Trailing,
        ],
        NodeKind::Global => &[
            Lead,
            Text("global"),
            Field("whitespace_after_global"),
            Field("names"),
            Field("semicolon"),
            Trailing,
        ],
        NodeKind::Nonlocal => &[
            Lead,
            Text("nonlocal"),
            Field("whitespace_after_nonlocal"),
            Field("names"),
            Field("semicolon"),
            Trailing,
        ],
        NodeKind::NameItem => &[Field("name"), Field("comma")],
        NodeKind::Import => &[
            Lead,
            Text("import"),
            Field("whitespace_after_import"),
            Field("names"),
            Field("semicolon"),
            Trailing,
        ],
        NodeKind::ImportFrom => &[
            Lead,
            Text("from"),
            Field("whitespace_after_from"),
            Field("relative"),
            Field("module"),
            Field("whitespace_before_import"),
            Text("import"),
            Field("whitespace_after_import"),
            Field("lpar"),
            Field("names"),
            Field("rpar"),
            Field("semicolon"),
            Trailing,
        ],
        NodeKind::ImportAlias => &[Field("name"), Field("asname"), Field("comma")],
        NodeKind::ImportStar => &[Text("*")],
        NodeKind::AsName => &[
            Field("whitespace_before_as"),
            Text("as"),
            Field("whitespace_after_as"),
            Field("name"),
        ],

        NodeKind::Decorator => &[
            Lead,
            Text("@"),
            Field("whitespace_after_at"),
            Field("decorator"),
            Field("trailing_whitespace"),
        ],
        // 装饰器之前的空行属于定义本身
        NodeKind::FunctionDef => &[
            Field("leading_lines"),
            Field("decorators"),
            Field("lines_after_decorators"),
            Indent,
            Field("asynchronous"),
            Text("def"),
            Field("whitespace_after_def"),
            Field("name"),
            Field("whitespace_after_name"),
            Field("params"),
            Field("returns"),
            Field("whitespace_before_colon"),
            Text(":"),
            Field("body"),
        ],
        NodeKind::Asynchronous => &[Text("async"), Field("whitespace_after")],
        NodeKind::Parameters => &[Field("lpar"), Field("params"), Field("rpar")],
        NodeKind::Param => &[
            Value("star"),
            Field("whitespace_after_star"),
            Field("name"),
            Field("annotation"),
            Field("equal"),
            Field("default"),
            Field("comma"),
        ],
        NodeKind::ParamStar => &[Text("*"), Field("comma")],
        NodeKind::ParamSlash => &[Text("/"), Field("comma")],
        NodeKind::Annotation => &[
            Field("whitespace_before_indicator"),
            Value("indicator"),
            Field("whitespace_after_indicator"),
            Field("annotation"),
        ],
        NodeKind::ClassDef => &[
            Field("leading_lines"),
            Field("decorators"),
            Field("lines_after_decorators"),
            Indent,
            Text("class"),
            Field("whitespace_after_class"),
            Field("name"),
            Field("whitespace_after_name"),
            Field("lpar"),
            Field("bases"),
            Field("rpar"),
            Field("whitespace_before_colon"),
            Text(":"),
            Field("body"),
        ],
        NodeKind::Else => &[
            Lead,
            Text("else"),
            Field("whitespace_before_colon"),
            Text(":"),
            Field("body"),
        ],
        NodeKind::While => &[
            Lead,
            Text("while"),
            Field("whitespace_after_while"),
            Field("test"),
            Field("whitespace_before_colon"),
            Text(":"),
            Field("body"),
            Field("orelse"),
        ],
        NodeKind::For => &[
            Lead,
            Field("asynchronous"),
            Text("for"),
            Field("whitespace_after_for"),
            Field("target"),
            Field("whitespace_before_in"),
            Text("in"),
            Field("whitespace_after_in"),
            Field("iter"),
            Field("whitespace_before_colon"),
            Text(":"),
            Field("body"),
            Field("orelse"),
        ],
        NodeKind::Try => &[
            Lead,
            Text("try"),
            Field("whitespace_before_colon"),
            Text(":"),
            Field("body"),
            Field("handlers"),
            Field("orelse"),
            Field("finalbody"),
        ],
        NodeKind::ExceptHandler => &[
            Lead,
            Text("except"),
            Field("whitespace_after_except"),
            Field("type"),
            Field("name"),
            Field("whitespace_before_colon"),
            Text(":"),
            Field("body"),
        ],
        NodeKind::Finally => &[
            Lead,
            Text("finally"),
            Field("whitespace_before_colon"),
            Text(":"),
            Field("body"),
        ],
        NodeKind::With => &[
            Lead,
            Field("asynchronous"),
            Text("with"),
            Field("whitespace_after_with"),
            Field("lpar"),
            Field("items"),
            Field("rpar"),
            Field("whitespace_before_colon"),
            Text(":"),
            Field("body"),
        ],
        NodeKind::WithItem => &[Field("item"), Field("asname"), Field("comma")],

        NodeKind::BooleanOperation | NodeKind::BinaryOperation => {
            &[Field("left"), Field("operator"), Field("right")]
        }
        NodeKind::UnaryOperation => &[Field("operator"), Field("expression")],
        NodeKind::Comparison => &[Field("left"), Field("comparisons")],
        NodeKind::ComparisonTarget => &[Field("operator"), Field("comparator")],
        NodeKind::IfExp => &[
            Field("body"),
            Field("whitespace_before_if"),
            Text("if"),
            Field("whitespace_after_if"),
            Field("test"),
            Field("whitespace_before_else"),
            Text("else"),
            Field("whitespace_after_else"),
            Field("orelse"),
        ],
        NodeKind::Lambda => &[
            Text("lambda"),
            Field("whitespace_after_lambda"),
            Field("params"),
            Field("colon"),
            Field("body"),
        ],
        NodeKind::Await => &[
            Text("await"),
            Field("whitespace_after_await"),
            Field("expression"),
        ],
        NodeKind::Yield => &[Text("yield"), Field("whitespace_after_yield"), Field("value")],
        NodeKind::Call => &[
            Field("func"),
            Field("whitespace_after_func"),
            Field("lpar"),
            Field("args"),
            Field("rpar"),
        ],
        NodeKind::Arg => &[
            Value("star"),
            Field("whitespace_after_star"),
            Field("keyword"),
            Field("equal"),
            Field("value"),
            Field("comma"),
        ],
        NodeKind::Attribute => &[Field("value"), Field("dot"), Field("attr")],
        NodeKind::Subscript => &[
            Field("value"),
            Field("whitespace_after_value"),
            Field("lbracket"),
            Field("slice"),
            Field("rbracket"),
        ],
        NodeKind::SubscriptElement => &[Field("slice"), Field("comma")],
        NodeKind::Index => &[Field("value")],
        NodeKind::Slice => &[
            Field("lower"),
            Field("first_colon"),
            Field("upper"),
            Field("second_colon"),
            Field("step"),
        ],
        NodeKind::Parenthesized => &[Field("lpar"), Field("value"), Field("rpar")],
        NodeKind::Tuple => &[Field("lpar"), Field("elements"), Field("rpar")],
        NodeKind::List => &[Field("lbracket"), Field("elements"), Field("rbracket")],
        NodeKind::Dict | NodeKind::Set => {
            &[Field("lbrace"), Field("elements"), Field("rbrace")]
        }
        NodeKind::Element => &[Field("value"), Field("comma")],
        NodeKind::StarredElement => &[
            Text("*"),
            Field("whitespace_before_value"),
            Field("value"),
            Field("comma"),
        ],
        NodeKind::DictElement => &[
            Field("key"),
            Field("whitespace_before_colon"),
            Text(":"),
            Field("whitespace_after_colon"),
            Field("value"),
            Field("comma"),
        ],
        NodeKind::StarredDictElement => &[
            Text("**"),
            Field("whitespace_before_value"),
            Field("value"),
            Field("comma"),
        ],
        NodeKind::GeneratorExp => &[Field("lpar"), Field("elt"), Field("for_in"), Field("rpar")],
        NodeKind::ListComp => &[
            Field("lbracket"),
            Field("elt"),
            Field("for_in"),
            Field("rbracket"),
        ],
        NodeKind::SetComp => &[Field("lbrace"), Field("elt"), Field("for_in"), Field("rbrace")],
        NodeKind::DictComp => &[
            Field("lbrace"),
            Field("key"),
            Field("whitespace_before_colon"),
            Text(":"),
            Field("whitespace_after_colon"),
            Field("value"),
            Field("for_in"),
            Field("rbrace"),
        ],
        NodeKind::CompFor => &[
            Field("whitespace_before"),
            Field("asynchronous"),
            Text("for"),
            Field("whitespace_after_for"),
            Field("target"),
            Field("whitespace_before_in"),
            Text("in"),
            Field("whitespace_after_in"),
            Field("iter"),
            Field("ifs"),
            Field("inner_for_in"),
        ],
        NodeKind::CompIf => &[
            Field("whitespace_before"),
            Text("if"),
            Field("whitespace_before_test"),
            Field("test"),
        ],
        NodeKind::ConcatenatedString => {
            &[Field("left"), Field("whitespace_between"), Field("right")]
        }
        NodeKind::Name
        | NodeKind::Integer
        | NodeKind::Float
        | NodeKind::Imaginary
        | NodeKind::SimpleString => &[Value("value")],

        NodeKind::NotIn => &[
            Field("whitespace_before"),
            Text("not"),
            Field("whitespace_between"),
            Text("in"),
            Field("whitespace_after"),
        ],
        NodeKind::IsNot => &[
            Field("whitespace_before"),
            Text("is"),
            Field("whitespace_between"),
            Text("not"),
            Field("whitespace_after"),
        ],

        // 标点和运算符在 emit 中按 token 输出
        _ => &[],
    }
}

/// 关键字与标点
fn text_class(text: &str) -> TokenClass {
    if text.starts_with(char::is_alphabetic) {
        TokenClass::Keyword
    } else {
        TokenClass::Operator
    }
}

/// 标量字段的类别由所在节点决定
fn value_class(kind: NodeKind, value: &str) -> TokenClass {
    match kind {
        NodeKind::Name if matches!(value, "True" | "False" | "None") => TokenClass::Keyword,
        NodeKind::Name => TokenClass::Name,
        NodeKind::Integer | NodeKind::Float | NodeKind::Imaginary => TokenClass::Number,
        NodeKind::SimpleString => TokenClass::String,
        NodeKind::Comment => TokenClass::Comment,
        NodeKind::SimpleWhitespace => TokenClass::Plain,
        _ => TokenClass::Operator,
    }
}

pub struct CodeGenerator<'t, W: TokenWriter = String> {
    tree: &'t Tree,
    /// 嵌套代码块的相对缩进
    indents: Vec<String>,
    /// 位于 `if x: pass` 这样的同行语句体内
    inline: bool,
    /// 上一条语句以 `;` 结束，下一条语句在同一行
    same_line: bool,
    output: W,
}

impl<'t> CodeGenerator<'t> {
    pub fn new(tree: &'t Tree) -> Self {
        Self::with_writer(tree, String::new())
    }
}

impl<'t, W: TokenWriter> CodeGenerator<'t, W> {
    pub fn with_writer(tree: &'t Tree, output: W) -> Self {
        Self {
            tree,
            indents: Vec::new(),
            inline: false,
            same_line: false,
            output,
        }
    }

    pub fn generate(mut self) -> W {
        self.emit(self.tree.root());
        self.output
    }

    fn emit(&mut self, node: NodeIdx) {
        let tree = self.tree;
        let kind = tree.kind(node);

        match kind {
            NodeKind::If => self.emit_if(node, "if"),
            NodeKind::IndentedBlock => {
                self.field(node, "header");
                self.indents
                    .push(tree.str_value(node, "indent").unwrap_or_default().to_string());
                self.field(node, "body");
                self.indents.pop();
            }
            NodeKind::SimpleStatementSuite => {
                self.field(node, "leading_whitespace");
                let inline = std::mem::replace(&mut self.inline, true);
                self.field(node, "body");
                self.inline = inline;
            }
            NodeKind::Newline => match tree.scalar(node, "value") {
                Some(Scalar::Str(value)) => self.output.write(TokenClass::Plain, value),
                _ => self.output.write(TokenClass::Plain, "\n"),
            },
            _ => match kind.token() {
                Some(token) => {
                    self.field(node, "whitespace_before");
                    self.output.write(text_class(token), token);
                    self.field(node, "whitespace_after");
                }
                None => self.emit_parts(node, layout(kind)),
            },
        }
    }

    fn emit_parts(&mut self, node: NodeIdx, parts: &[Part]) {
        let tree = self.tree;
        for part in parts {
            match *part {
                Part::Field(name) => self.field(node, name),
                Part::Value(name) => {
                    if let Some(value) = tree.str_value(node, name) {
                        self.output.write(value_class(tree.kind(node), value), value);
                    }
                }
                Part::Text(text) => self.output.write(text_class(text), text),
                Part::Indent => self.indent(),
                Part::Lead => {
                    self.field(node, "leading_lines");
                    self.indent();
                }
                Part::Trailing => match tree.child(node, "trailing_whitespace") {
                    Some(trailing) => self.emit(trailing),
                    None => self.same_line = true,
                },
            }
        }
    }

    /// if 与 elif 共用同一种节点
    fn emit_if(&mut self, node: NodeIdx, keyword: &'static str) {
        self.emit_parts(
            node,
            &[
                Part::Lead,
                Part::Text(keyword),
                Part::Field("whitespace_before_test"),
                Part::Field("test"),
                Part::Field("whitespace_after_test"),
                Part::Text(":"),
                Part::Field("body"),
            ],
        );

        if let Some(orelse) = self.tree.child(node, "orelse") {
            match self.tree.kind(orelse) {
                NodeKind::If => self.emit_if(orelse, "elif"),
                _ => self.emit(orelse),
            }
        }
    }

    fn indent(&mut self) {
        let same_line = std::mem::take(&mut self.same_line);
        if self.inline || same_line {
            return;
        }
        for indent in &self.indents {
            self.output.write(TokenClass::Plain, indent);
        }
    }

    fn field(&mut self, node: NodeIdx, name: &str) {
        let tree = self.tree;
        for &child in tree.children(node, name) {
            self.emit(child);
        }
    }
}

/// 由语法树重新生成源码
pub fn codegen(tree: &Tree) -> String {
    CodeGenerator::new(tree).generate()
}
