// Glob matching for KEYS
//
// Supports `*`, `?`, character classes with ranges and `^` negation, and
// backslash escapes. Compilation is lenient: an unterminated class is
// matched literally.

enum Token {
    Literal(char),
    /// `?`
    Any,
    /// `*`
    Star,
    Class {
        negated: bool,
        members: Vec<char>,
        ranges: Vec<(char, char)>,
    },
}

pub struct Pattern {
    tokens: Vec<Token>,
}

impl Pattern {
    pub fn compile(pattern: &str) -> Self {
        let mut tokens = Vec::new();
        let mut chars = pattern.chars().peekable();
        while let Some(c) = chars.next() {
            match c {
                '*' => {
                    // collapse runs of stars, they match the same thing
                    if !matches!(tokens.last(), Some(Token::Star)) {
                        tokens.push(Token::Star);
                    }
                }
                '?' => tokens.push(Token::Any),
                '\\' => {
                    let literal = chars.next().unwrap_or('\\');
                    tokens.push(Token::Literal(literal));
                }
                '[' => match parse_class(&mut chars) {
                    Some(class) => tokens.push(class),
                    None => tokens.push(Token::Literal('[')),
                },
                other => tokens.push(Token::Literal(other)),
            }
        }
        Self { tokens }
    }

    pub fn matches(&self, input: &str) -> bool {
        let chars: Vec<char> = input.chars().collect();
        match_here(&self.tokens, &chars)
    }
}

/// Parse the body of a `[...]` class; `chars` sits just past the opening
/// bracket. Returns None when the class never closes, leaving `chars`
/// untouched so the bracket falls back to a literal.
fn parse_class(chars: &mut std::iter::Peekable<std::str::Chars<'_>>) -> Option<Token> {
    // Probe with a clone first: the class must contain at least one
    // member and a closing bracket.
    {
        let mut probe = chars.clone();
        if probe.peek() == Some(&'^') {
            probe.next();
        }
        let mut seen_member = false;
        let mut closed = false;
        while let Some(c) = probe.next() {
            match c {
                '\\' => {
                    probe.next()?;
                    seen_member = true;
                }
                ']' if seen_member => {
                    closed = true;
                    break;
                }
                _ => seen_member = true,
            }
        }
        if !closed {
            return None;
        }
    }

    let mut negated = false;
    if chars.peek() == Some(&'^') {
        chars.next();
        negated = true;
    }

    let mut members = Vec::new();
    let mut ranges = Vec::new();
    let mut first = true;
    loop {
        let c = chars.next()?;
        if c == ']' && !first {
            break;
        }
        first = false;
        let member = if c == '\\' { chars.next()? } else { c };
        if chars.peek() == Some(&'-') {
            let mut look = chars.clone();
            look.next();
            match look.peek() {
                Some(&end) if end != ']' => {
                    chars.next();
                    let end = chars.next()?;
                    let end = if end == '\\' { chars.next()? } else { end };
                    ranges.push((member, end));
                    continue;
                }
                _ => {}
            }
        }
        members.push(member);
    }

    Some(Token::Class {
        negated,
        members,
        ranges,
    })
}

fn match_here(tokens: &[Token], input: &[char]) -> bool {
    let Some(token) = tokens.first() else {
        return input.is_empty();
    };
    match token {
        Token::Star => (0..=input.len()).any(|skip| match_here(&tokens[1..], &input[skip..])),
        Token::Any => !input.is_empty() && match_here(&tokens[1..], &input[1..]),
        Token::Literal(c) => input.first() == Some(c) && match_here(&tokens[1..], &input[1..]),
        Token::Class {
            negated,
            members,
            ranges,
        } => {
            let Some(&c) = input.first() else {
                return false;
            };
            let inside =
                members.contains(&c) || ranges.iter().any(|&(lo, hi)| c >= lo && c <= hi);
            inside != *negated && match_here(&tokens[1..], &input[1..])
        }
    }
}
