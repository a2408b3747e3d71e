use crate::error::PatternError;
use crate::syntax::SyntaxPriority;
use crate::types::{SemanticType, TypeRegistry};
use nom::branch::alt;
use nom::bytes::complete::take_while1;
use nom::character::complete::{anychar, char, digit1, none_of, one_of};
use nom::combinator::{all_consuming, map, map_res, opt, recognize};
use nom::multi::{many0, many1, separated_list1};
use nom::sequence::{delimited, pair, preceded, terminated};
use nom::IResult;
use regex::Regex;
use std::sync::Arc;

/// Placeholder modifiers written before the type list
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct PlaceholderFlags {
    /// `-`: no default value when the placeholder is omitted
    pub no_default: bool,
    /// `*`: only literals are accepted
    pub literal_only: bool,
    /// `~`: literals are rejected
    pub non_literal_only: bool,
}

/// A typed `%...%` slot, resolved by parsing its span as an expression
#[derive(Debug, Clone)]
pub struct Placeholder {
    /// Position among the pattern's placeholders, left to right
    pub index: usize,
    pub types: Vec<Arc<SemanticType>>,
    /// Written with a plural code name (`%numbers%`)
    pub plural: bool,
    pub flags: PlaceholderFlags,
    /// Index of the first placeholder accepting exactly the same values
    pub(crate) equivalent: usize,
}

#[derive(Debug, Clone)]
pub struct Alternative {
    pub mark: i32,
    pub elements: Vec<Element>,
}

#[derive(Debug, Clone)]
pub struct Group {
    pub alternatives: Vec<Alternative>,
    pub optional: bool,
    /// Order in which alternatives are attempted
    pub try_order: Vec<usize>,
    /// Placeholders anywhere inside the group
    pub placeholders: Vec<usize>,
}

#[derive(Debug, Clone)]
pub enum Element {
    /// Lowercased word(s) without spaces
    Literal(String),
    /// Elastic whitespace
    Space,
    Group(Group),
    Placeholder(usize),
    Regex(usize),
}

/// A compiled syntax pattern
#[derive(Debug, Clone)]
pub struct Pattern {
    source: String,
    pub(crate) elements: Vec<Element>,
    pub(crate) placeholders: Vec<Placeholder>,
    pub(crate) regexes: Vec<Regex>,
}

impl Pattern {
    /// Compile a pattern, resolving placeholder types against `types`
    pub fn compile(source: &str, types: &TypeRegistry) -> Result<Self, PatternError> {
        let trimmed = source.trim();
        let raw = match all_consuming(alternatives)(trimmed) {
            Ok((_, raw)) => raw,
            Err(nom::Err::Error(e)) | Err(nom::Err::Failure(e)) => {
                let offset = trimmed.len() - e.input.len();
                return Err(PatternError::Malformed {
                    pattern: source.to_string(),
                    offset,
                    message: describe_failure(e.input),
                });
            }
            Err(nom::Err::Incomplete(_)) => {
                return Err(PatternError::Malformed {
                    pattern: source.to_string(),
                    offset: trimmed.len(),
                    message: "unexpected end of pattern".into(),
                })
            }
        };

        let mut builder = Builder {
            source,
            types,
            placeholders: Vec::new(),
            regexes: Vec::new(),
        };
        let elements = if raw.len() == 1 && raw[0].mark == 0 {
            let only = raw.into_iter().next().map(|alt| alt.items).unwrap_or_default();
            builder.sequence(only)?
        } else {
            vec![Element::Group(builder.group(raw, false)?)]
        };

        Ok(Self {
            source: source.to_string(),
            elements,
            placeholders: builder.placeholders,
            regexes: builder.regexes,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn placeholders(&self) -> &[Placeholder] {
        &self.placeholders
    }

    pub fn elements(&self) -> &[Element] {
        &self.elements
    }

    /// Priority implied by the pattern's shape
    pub fn inferred_priority(&self) -> SyntaxPriority {
        let first = self.elements.first();
        let last = self.elements.last();
        if self.placeholders.is_empty() && self.regexes.is_empty() {
            SyntaxPriority::SIMPLE
        } else if is_greedy(first) && is_greedy(last) {
            SyntaxPriority::PATTERN_MATCHES_EVERYTHING
        } else {
            SyntaxPriority::COMBINED
        }
    }
}

fn is_greedy(element: Option<&Element>) -> bool {
    matches!(element, Some(Element::Placeholder(_)) | Some(Element::Regex(_)))
}

fn describe_failure(rest: &str) -> String {
    match rest.chars().next() {
        Some('[') => "unclosed optional group".into(),
        Some('(') => "unclosed choice group".into(),
        Some('%') => "unclosed or malformed placeholder".into(),
        Some('<') => "unclosed regex".into(),
        Some(']') | Some(')') => "unmatched closing bracket".into(),
        Some('|') => "'|' outside of a group".into(),
        Some(c) => format!("unexpected '{}'", c),
        None => "unexpected end of pattern".into(),
    }
}

// ---------------------------------------------------------------------------
// Raw grammar
// ---------------------------------------------------------------------------

#[derive(Debug)]
enum Raw {
    Text(String),
    Group { alternatives: Vec<RawAlternative>, optional: bool },
    Placeholder { flags: PlaceholderFlags, types: Vec<String> },
    Regex(String),
}

#[derive(Debug)]
struct RawAlternative {
    mark: i32,
    items: Vec<Raw>,
}

fn alternatives(input: &str) -> IResult<&str, Vec<RawAlternative>> {
    separated_list1(char('|'), alternative)(input)
}

fn alternative(input: &str) -> IResult<&str, RawAlternative> {
    let (input, mark) = opt(terminated(
        map_res(recognize(pair(opt(char('-')), digit1)), str::parse::<i32>),
        char('¦'),
    ))(input)?;
    let (input, items) = many0(item)(input)?;
    Ok((
        input,
        RawAlternative {
            mark: mark.unwrap_or(0),
            items,
        },
    ))
}

fn item(input: &str) -> IResult<&str, Raw> {
    alt((optional_group, choice_group, placeholder, regex_element, text))(input)
}

fn optional_group(input: &str) -> IResult<&str, Raw> {
    map(delimited(char('['), alternatives, char(']')), |alternatives| Raw::Group {
        alternatives,
        optional: true,
    })(input)
}

fn choice_group(input: &str) -> IResult<&str, Raw> {
    map(delimited(char('('), alternatives, char(')')), |alternatives| Raw::Group {
        alternatives,
        optional: false,
    })(input)
}

fn placeholder(input: &str) -> IResult<&str, Raw> {
    let type_name = take_while1(|c: char| c.is_ascii_alphanumeric() || c == '-');
    map(
        delimited(
            char('%'),
            pair(many0(one_of("-*~")), separated_list1(char('/'), type_name)),
            char('%'),
        ),
        |(flag_chars, types): (Vec<char>, Vec<&str>)| {
            let mut flags = PlaceholderFlags::default();
            for flag in flag_chars {
                match flag {
                    '-' => flags.no_default = true,
                    '*' => flags.literal_only = true,
                    _ => flags.non_literal_only = true,
                }
            }
            Raw::Placeholder {
                flags,
                types: types.into_iter().map(str::to_lowercase).collect(),
            }
        },
    )(input)
}

/// `<...>` up to the first unescaped `>`; `\>` stands for `>`
fn regex_element(input: &str) -> IResult<&str, Raw> {
    let (rest, _) = char('<')(input)?;
    let mut body = String::new();
    let mut chars = rest.char_indices();
    while let Some((i, c)) = chars.next() {
        match c {
            '>' => return Ok((&rest[i + 1..], Raw::Regex(body))),
            '\\' => match chars.next() {
                Some((_, '>')) => body.push('>'),
                Some((_, other)) => {
                    body.push('\\');
                    body.push(other);
                }
                None => break,
            },
            _ => body.push(c),
        }
    }
    Err(nom::Err::Error(nom::error::Error::new(
        input,
        nom::error::ErrorKind::TakeUntil,
    )))
}

fn text(input: &str) -> IResult<&str, Raw> {
    map(
        many1(alt((preceded(char('\\'), anychar), none_of("[]()|%<>\\")))),
        |chars: Vec<char>| Raw::Text(chars.into_iter().collect()),
    )(input)
}

// ---------------------------------------------------------------------------
// Resolution into elements
// ---------------------------------------------------------------------------

struct Builder<'a> {
    source: &'a str,
    types: &'a TypeRegistry,
    placeholders: Vec<Placeholder>,
    regexes: Vec<Regex>,
}

impl Builder<'_> {
    fn sequence(&mut self, items: Vec<Raw>) -> Result<Vec<Element>, PatternError> {
        let mut elements = Vec::new();
        for item in items {
            match item {
                Raw::Text(text) => push_text(&mut elements, &text),
                Raw::Group {
                    alternatives,
                    optional,
                } => elements.push(Element::Group(self.group(alternatives, optional)?)),
                Raw::Placeholder { flags, types } => {
                    elements.push(Element::Placeholder(self.placeholder(flags, &types)?))
                }
                Raw::Regex(body) => {
                    let regex = Regex::new(&format!("(?is)^(?:{})$", body)).map_err(|e| {
                        PatternError::InvalidRegex {
                            pattern: self.source.to_string(),
                            message: e.to_string(),
                        }
                    })?;
                    self.regexes.push(regex);
                    elements.push(Element::Regex(self.regexes.len() - 1));
                }
            }
        }
        Ok(elements)
    }

    fn group(&mut self, raw: Vec<RawAlternative>, optional: bool) -> Result<Group, PatternError> {
        let first_placeholder = self.placeholders.len();
        let mut alternatives = Vec::with_capacity(raw.len());
        for alt in raw {
            alternatives.push(Alternative {
                mark: alt.mark,
                elements: self.sequence(alt.items)?,
            });
        }
        let placeholders = (first_placeholder..self.placeholders.len()).collect();

        let mut try_order: Vec<usize> = (0..alternatives.len()).collect();
        let literal_lengths: Option<Vec<usize>> = alternatives.iter().map(literal_length).collect();
        if let Some(lengths) = literal_lengths {
            // stable: equal lengths keep their written order
            try_order.sort_by(|a, b| lengths[*b].cmp(&lengths[*a]));
        }

        Ok(Group {
            alternatives,
            optional,
            try_order,
            placeholders,
        })
    }

    fn placeholder(&mut self, flags: PlaceholderFlags, names: &[String]) -> Result<usize, PatternError> {
        let mut types = Vec::with_capacity(names.len());
        let mut plural = false;
        for name in names {
            let (ty, is_plural) =
                self.types
                    .resolve_pattern_name(name)
                    .ok_or_else(|| PatternError::UnknownType {
                        pattern: self.source.to_string(),
                        code_name: name.clone(),
                    })?;
            plural |= is_plural;
            types.push(ty);
        }

        let index = self.placeholders.len();
        let equivalent = self
            .placeholders
            .iter()
            .find(|p| {
                p.plural == plural
                    && p.flags == flags
                    && p.types.len() == types.len()
                    && p.types.iter().zip(&types).all(|(a, b)| Arc::ptr_eq(a, b))
            })
            .map(|p| p.index)
            .unwrap_or(index);
        self.placeholders.push(Placeholder {
            index,
            types,
            plural,
            flags,
            equivalent,
        });
        Ok(index)
    }
}

/// Split text into lowercased words separated by single `Space` elements
fn push_text(elements: &mut Vec<Element>, text: &str) {
    let mut word = String::new();
    for c in text.chars() {
        if c.is_whitespace() {
            if !word.is_empty() {
                elements.push(Element::Literal(std::mem::take(&mut word).to_lowercase()));
            }
            if !matches!(elements.last(), Some(Element::Space)) {
                elements.push(Element::Space);
            }
        } else {
            word.push(c);
        }
    }
    if !word.is_empty() {
        elements.push(Element::Literal(word.to_lowercase()));
    }
}

/// Character length of an alternative made only of literal text
fn literal_length(alternative: &Alternative) -> Option<usize> {
    alternative.elements.iter().try_fold(0, |len, e| match e {
        Element::Literal(s) => Some(len + s.chars().count()),
        Element::Space => Some(len + 1),
        _ => None,
    })
}
