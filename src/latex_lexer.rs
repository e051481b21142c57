use derive_more::Display;
use logos::{Lexer, Logos};
use unicode_segmentation::UnicodeSegmentation;

#[derive(Debug, Clone, PartialEq, Eq, Display)]
pub enum Token {
    /// One grapheme cluster of source text.
    #[display("{_0}")]
    Literal(String),
    /// A control word (`\alpha`, `\frac*`) or control symbol (`\,`, `\{`),
    /// stored without its backslash.
    #[display("\\{_0}")]
    Command(String),
    #[display("{{")]
    GroupOpen,
    #[display("}}")]
    GroupClose,
    #[display("^")]
    Superscript,
    #[display("_")]
    Subscript,
    /// `#1`..`#9`, `#0` or `#?`.
    #[display("#{_0}")]
    Parameter(char),
    #[display("$")]
    InlineShift,
    #[display("$$")]
    DisplayShift,
    #[display(" ")]
    Space,
    /// A trailing backslash with nothing after it.
    #[display("\\")]
    Escape,
}

impl Token {
    pub fn literal(s: impl Into<String>) -> Self {
        Token::Literal(s.into())
    }

    pub fn command(s: impl Into<String>) -> Self {
        Token::Command(s.into())
    }

    pub fn is_literal(&self, s: &str) -> bool {
        matches!(self, Token::Literal(l) if l == s)
    }

    pub fn is_command(&self, s: &str) -> bool {
        matches!(self, Token::Command(c) if c == s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Hash {
    Parameter(char),
    Literal,
}

#[derive(Logos, Debug, Clone, Copy, PartialEq)]
#[logos(skip r"%[^\n]*")]
enum RawToken<'a> {
    #[regex(r"[ \t\r\n\f]+")]
    Space,

    #[regex(r"\\[a-zA-Z][a-zA-Z*]*", |lex| &lex.slice()[1..])]
    #[regex(r"\\[^a-zA-Z]", |lex| &lex.slice()[1..])]
    Command(&'a str),

    #[token("\\")]
    Escape,

    #[token("{")]
    GroupOpen,

    #[token("}")]
    GroupClose,

    #[token("#", parameter)]
    Hash(Hash),

    #[token("^")]
    Superscript,

    #[token("_")]
    Subscript,

    #[token("$$")]
    DisplayShift,

    #[token("$")]
    InlineShift,

    #[regex(r"[^\\{}#^_$% \t\r\n\f]", grapheme)]
    Literal(&'a str),
}

fn parameter<'a>(lex: &mut Lexer<'a, RawToken<'a>>) -> Hash {
    let mut rest = lex.remainder().chars();
    match (rest.next(), rest.next()) {
        (Some(c @ ('0'..='9' | '?')), next) if !next.is_some_and(char::is_alphanumeric) => {
            lex.bump(1);
            Hash::Parameter(c)
        }
        _ => Hash::Literal,
    }
}

fn grapheme<'a>(lex: &mut Lexer<'a, RawToken<'a>>) -> &'a str {
    let start = lex.span().start;
    let cluster = lex.source()[start..]
        .graphemes(true)
        .next()
        .map_or(0, str::len);
    lex.bump(cluster.saturating_sub(lex.slice().len()));
    lex.slice()
}

/// Splits LaTeX source into tokens. Never fails: anything unrecognized comes
/// out as a literal.
pub fn tokenize(text: &str) -> Vec<Token> {
    let mut lexer = RawToken::lexer(text);
    let mut tokens = vec![];

    while let Some(raw) = lexer.next() {
        tokens.push(match raw {
            Ok(RawToken::Space) => Token::Space,
            Ok(RawToken::Command("bgroup")) => Token::GroupOpen,
            Ok(RawToken::Command("egroup")) => Token::GroupClose,
            Ok(RawToken::Command(name)) => Token::command(name),
            Ok(RawToken::Escape) => Token::Escape,
            Ok(RawToken::GroupOpen) => Token::GroupOpen,
            Ok(RawToken::GroupClose) => Token::GroupClose,
            Ok(RawToken::Hash(Hash::Parameter(c))) => Token::Parameter(c),
            Ok(RawToken::Hash(Hash::Literal)) => Token::literal("#"),
            Ok(RawToken::Superscript) => Token::Superscript,
            Ok(RawToken::Subscript) => Token::Subscript,
            Ok(RawToken::DisplayShift) => Token::DisplayShift,
            Ok(RawToken::InlineShift) => Token::InlineShift,
            Ok(RawToken::Literal(s)) => Token::literal(s),
            Err(()) => Token::literal(lexer.slice()),
        });
    }

    tokens
}

/// Joins tokens back into LaTeX source, inserting a space where a control
/// word would otherwise run into a following letter.
pub fn tokens_to_string(tokens: &[Token]) -> String {
    let mut latex = String::new();
    for (i, token) in tokens.iter().enumerate() {
        latex += &token.to_string();
        if let Token::Command(name) = token {
            let is_word = name.chars().next().is_some_and(|c| c.is_ascii_alphabetic());
            let runs_on = matches!(
                tokens.get(i + 1),
                Some(Token::Literal(next)) if next.starts_with(|c: char| c.is_ascii_alphabetic())
            );
            if is_word && runs_on {
                latex.push(' ');
            }
        }
    }
    latex
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use Token::*;

    fn lit(s: &str) -> Token {
        Token::literal(s)
    }

    fn cmd(s: &str) -> Token {
        Token::command(s)
    }

    #[test]
    fn commands_and_groups() {
        assert_eq!(
            tokenize(r"\frac{1}{x}"),
            [cmd("frac"), GroupOpen, lit("1"), GroupClose, GroupOpen, lit("x"), GroupClose]
        );
        assert_eq!(tokenize(r"\operatorname*"), [cmd("operatorname*")]);
        assert_eq!(tokenize(r"\,\{"), [cmd(","), cmd("{")]);
        assert_eq!(tokenize(r"\bgroup a\egroup"), [GroupOpen, lit("a"), GroupClose]);
    }

    #[test]
    fn whitespace_collapses() {
        assert_eq!(tokenize("a  \n\t b"), [lit("a"), Space, lit("b")]);
    }

    #[test]
    fn unicode_spaces_are_literals() {
        assert_eq!(
            tokenize("a\u{a0}b\u{2009}"),
            [lit("a"), lit("\u{a0}"), lit("b"), lit("\u{2009}")]
        );
    }

    #[test]
    fn comments_are_stripped() {
        assert_eq!(tokenize("a% comment\nb"), [lit("a"), Space, lit("b")]);
        assert_eq!(tokenize(r"50\%"), [lit("5"), lit("0"), cmd("%")]);
    }

    #[test]
    fn parameters() {
        assert_eq!(tokenize("#1+#?"), [Parameter('1'), lit("+"), Parameter('?')]);
        assert_eq!(tokenize("#1a"), [lit("#"), lit("1"), lit("a")]);
        assert_eq!(tokenize("#x"), [lit("#"), lit("x")]);
        assert_eq!(tokenize("#2"), [Parameter('2')]);
    }

    #[test]
    fn scripts_and_mode_shifts() {
        assert_eq!(
            tokenize("$$x^2_i$"),
            [DisplayShift, lit("x"), Superscript, lit("2"), Subscript, lit("i"), InlineShift]
        );
    }

    #[test]
    fn grapheme_clusters_stay_whole() {
        assert_eq!(tokenize("e\u{301}x"), [lit("e\u{301}"), lit("x")]);
        assert_eq!(tokenize("α≤β"), [lit("α"), lit("≤"), lit("β")]);
    }

    #[test]
    fn trailing_backslash_is_an_escape() {
        assert_eq!(tokenize(r"x\"), [lit("x"), Escape]);
    }

    #[test]
    fn round_trips_to_string() {
        let source = r"\alpha x+\frac{1}{2}^{#1}";
        assert_eq!(tokens_to_string(&tokenize(source)), source);
    }
}
