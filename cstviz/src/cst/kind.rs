//! Node kinds produced by the CST parser

macro_rules! node_kinds {
    ($($kind:ident $(= $token:literal)?),* $(,)?) => {
        /// CST 节点类型（名称与 LibCST 保持一致）
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum NodeKind {
            $($kind),*
        }

        impl NodeKind {
            pub fn as_str(self) -> &'static str {
                match self {
                    $(Self::$kind => stringify!($kind)),*
                }
            }

            /// 运算符和标点节点对应的源码 token
            pub fn token(self) -> Option<&'static str> {
                match self {
                    $(Self::$kind => node_kinds!(@token $($token)?)),*
                }
            }
        }
    };
    (@token $token:literal) => { Some($token) };
    (@token) => { None };
}

node_kinds! {
    Module,

    // trivia
    SimpleWhitespace,
    ParenthesizedWhitespace,
    Newline,
    Comment,
    TrailingWhitespace,
    EmptyLine,

    // simple statements
    Expr,
    Assign,
    AssignTarget,
    AnnAssign,
    AugAssign,
    Return,
    Pass,
    Break,
    Continue,
    Raise,
    Del,
    Assert,
    Global,
    Nonlocal,
    NameItem,
    Import,
    ImportFrom,
    ImportAlias,
    ImportStar,
    AsName,
    From,

    // compound statements
    FunctionDef,
    Decorator,
    Asynchronous,
    Parameters,
    Param,
    ParamStar,
    ParamSlash,
    Annotation,
    ClassDef,
    If,
    Else,
    While,
    For,
    Try,
    ExceptHandler,
    Finally,
    With,
    WithItem,
    IndentedBlock,
    SimpleStatementSuite,

    // expressions
    BooleanOperation,
    UnaryOperation,
    BinaryOperation,
    Comparison,
    ComparisonTarget,
    IfExp,
    Lambda,
    Await,
    Yield,
    Call,
    Arg,
    Attribute,
    Subscript,
    SubscriptElement,
    Index,
    Slice,
    Parenthesized,
    Tuple,
    List,
    Set,
    Element,
    StarredElement,
    Dict,
    DictElement,
    StarredDictElement,
    GeneratorExp,
    ListComp,
    SetComp,
    DictComp,
    CompFor,
    CompIf,
    Name,
    Integer,
    Float,
    Imaginary,
    SimpleString,
    ConcatenatedString,
    Ellipsis = "...",

    // punctuation
    LeftParen = "(",
    RightParen = ")",
    LeftSquareBracket = "[",
    RightSquareBracket = "]",
    LeftCurlyBrace = "{",
    RightCurlyBrace = "}",
    Comma = ",",
    Dot = ".",
    Colon = ":",
    Semicolon = ";",
    AssignEqual = "=",

    // boolean and unary operators
    And = "and",
    Or = "or",
    Not = "not",
    Minus = "-",
    Plus = "+",
    BitInvert = "~",

    // comparison operators
    Equal = "==",
    NotEqual = "!=",
    LessThan = "<",
    LessThanEqual = "<=",
    GreaterThan = ">",
    GreaterThanEqual = ">=",
    In = "in",
    NotIn,
    Is = "is",
    IsNot,

    // binary operators
    Add = "+",
    Subtract = "-",
    Multiply = "*",
    Divide = "/",
    FloorDivide = "//",
    Modulo = "%",
    MatrixMultiply = "@",
    Power = "**",
    BitOr = "|",
    BitAnd = "&",
    BitXor = "^",
    LeftShift = "<<",
    RightShift = ">>",

    // augmented assignment operators
    AddAssign = "+=",
    SubtractAssign = "-=",
    MultiplyAssign = "*=",
    DivideAssign = "/=",
    FloorDivideAssign = "//=",
    ModuloAssign = "%=",
    MatrixMultiplyAssign = "@=",
    PowerAssign = "**=",
    BitOrAssign = "|=",
    BitAndAssign = "&=",
    BitXorAssign = "^=",
    LeftShiftAssign = "<<=",
    RightShiftAssign = ">>=",
}

impl NodeKind {
    /// 纯 trivia：不进入 span 索引
    pub fn is_trivia(self) -> bool {
        matches!(
            self,
            Self::TrailingWhitespace | Self::SimpleWhitespace | Self::Newline
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_and_tokens() {
        assert_eq!(NodeKind::AssignTarget.as_str(), "AssignTarget");
        assert_eq!(NodeKind::FloorDivide.token(), Some("//"));
        assert_eq!(NodeKind::RightShiftAssign.token(), Some(">>="));
        assert_eq!(NodeKind::Semicolon.as_str(), "Semicolon");
        assert_eq!(NodeKind::NotIn.token(), None);
        assert_eq!(NodeKind::Name.token(), None);
    }

    #[test]
    fn test_trivia_kinds() {
        assert!(NodeKind::Newline.is_trivia());
        assert!(NodeKind::SimpleWhitespace.is_trivia());
        assert!(!NodeKind::EmptyLine.is_trivia());
        assert!(!NodeKind::Comment.is_trivia());
        assert!(!NodeKind::ParenthesizedWhitespace.is_trivia());
    }
}
