//! Place notation: the [`Change`] operator between consecutive rows, and parsing of full
//! method notation in the common textual formats.

use std::fmt::{Display, Formatter, Write};

use itertools::Itertools;

use crate::{Bell, Row, RowBuf, Stage};

/// An error created when parsing place notation fails.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum ParseError {
    /// The notation contained no changes at all
    Empty,
    /// A character which is neither a bell name nor notation syntax
    UnknownChar(char),
    /// A comma-separated block contained no changes
    EmptyBlock,
    /// A leadhead code which doesn't select a leadhead
    BadLeadheadCode(String),
}

impl Display for ParseError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ParseError::Empty => write!(f, "place notation is empty"),
            ParseError::UnknownChar(c) => write!(f, "character {:?} is not place notation", c),
            ParseError::EmptyBlock => write!(f, "empty block in place notation"),
            ParseError::BadLeadheadCode(code) => {
                write!(f, "{:?} is not a leadhead code", code)
            }
        }
    }
}

impl std::error::Error for ParseError {}

/// A single change: the set of places held fixed between two consecutive rows.  Every pair of
/// adjacent unheld places swaps.  An empty place list is the 'cross' change.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct Change {
    /// 1-indexed places, sorted and deduplicated.  These are the places as written; implicit
    /// external places are added when the change is applied to a row of known [`Stage`].
    places: Vec<u8>,
}

impl Change {
    /// The 'cross' change, which swaps every adjacent pair.
    pub fn cross() -> Self {
        Change { places: Vec::new() }
    }

    /// Creates a `Change` holding the given 1-indexed places.
    pub fn from_places(mut places: Vec<u8>) -> Self {
        places.sort_unstable();
        places.dedup();
        Change { places }
    }

    /// Parses a `Change` from a string of place names (e.g. `"1258"`), with `x` or `-` parsing
    /// as the cross change.
    pub fn parse(s: &str) -> Result<Self, ParseError> {
        if matches!(s, "x" | "X" | "-") {
            return Ok(Self::cross());
        }
        let places = s
            .chars()
            .map(|c| {
                Bell::from_name(c)
                    .map(|b| b.number() as u8)
                    .ok_or(ParseError::UnknownChar(c))
            })
            .collect::<Result<Vec<_>, _>>()?;
        if places.is_empty() {
            return Err(ParseError::EmptyBlock);
        }
        Ok(Self::from_places(places))
    }

    /// `true` if this is the cross change.
    #[inline]
    pub fn is_cross(&self) -> bool {
        self.places.is_empty()
    }

    /// The places as written, 1-indexed and sorted.
    pub fn places(&self) -> &[u8] {
        &self.places
    }

    /// The highest place made by this change, if any.
    pub fn highest_place(&self) -> Option<u8> {
        self.places.last().copied()
    }

    /// The written places, extended with the implicit places a ringer would infer on the given
    /// stage.  Wherever an odd place appears where an even one is expected (or vice versa), the
    /// position just before it is held too; the same applies to the trailing external place.
    pub fn normalised_places(&self, stage: Stage) -> Vec<u8> {
        let n = stage.num_bells() as u8;
        let mut norm = Vec::with_capacity(self.places.len() + 2);
        let mut next_unhandled = 1u8;
        for &p in self.places.iter().filter(|&&p| p <= n) {
            if p < next_unhandled {
                continue;
            }
            if (p - next_unhandled) % 2 == 1 {
                norm.push(p - 1);
            }
            norm.push(p);
            next_unhandled = p + 1;
        }
        if next_unhandled <= n && (n - next_unhandled + 1) % 2 == 1 {
            norm.push(n);
        }
        norm
    }

    /// Applies this change to a [`Row`], swapping every adjacent pair of unheld places.
    pub fn permute(&self, row: &Row) -> RowBuf {
        let n = row.stage().num_bells();
        let mut bells = row.bells().to_vec();
        let held = self.normalised_places(row.stage());
        let mut held_iter = held.iter().peekable();
        let mut place = 0;
        while place < n {
            if held_iter.peek() == Some(&&(place as u8 + 1)) {
                held_iter.next();
                place += 1;
            } else {
                bells.swap(place, place + 1);
                place += 2;
            }
        }
        // SAFETY: swapping entries of a valid row keeps it valid
        unsafe { RowBuf::from_vec_unchecked(bells) }
    }

    /// The row generated by applying this change to rounds.
    pub fn perm_row(&self, stage: Stage) -> RowBuf {
        self.permute(&RowBuf::rounds(stage))
    }

    /// Reflects this change about the centre of the given stage (place `p` becomes `n + 1 - p`).
    pub fn mirrored(&self, stage: Stage) -> Change {
        let n = stage.num_bells() as u8;
        Self::from_places(
            self.normalised_places(stage)
                .iter()
                .map(|&p| n + 1 - p)
                .collect_vec(),
        )
    }

    /// `true` if `self` and `other` denote the same change on the given stage (i.e. their
    /// normalised places are equal).
    pub fn eq_on(&self, other: &Change, stage: Stage) -> bool {
        self.normalised_places(stage) == other.normalised_places(stage)
    }
}

impl Display for Change {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if self.is_cross() {
            return write!(f, "x");
        }
        for &p in &self.places {
            f.write_char(
                Bell::from_number(p as usize)
                    .expect("places are always in the nameable range")
                    .name(),
            )?;
        }
        Ok(())
    }
}

/// One comma-separated block of a method's place notation.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct PnBlock {
    /// `true` for `&`-blocks, which expand as a palindrome about their final change.
    pub symmetric: bool,
    pub changes: Vec<Change>,
}

impl PnBlock {
    /// Appends this block's expanded changes to `out`.
    fn expand_into(&self, out: &mut Vec<Change>) {
        out.extend(self.changes.iter().cloned());
        if self.symmetric && self.changes.len() > 1 {
            out.extend(self.changes[..self.changes.len() - 1].iter().rev().cloned());
        }
    }
}

/// A method's place notation: a sequence of blocks which expand into one change per row of the
/// lead.
///
/// Four textual forms are accepted, all case-insensitive and whitespace-tolerant:
///
/// 1. dot-separated changes with `x` or `-` for cross, the leadhead notation split off by
///    whitespace: `x38x14x1258x36x14x58x16x78 12`;
/// 2. the same with an explicit `l`/`lh` marker before the leadhead: `... lh 12`;
/// 3. comma-separated blocks, each prefixed `&` (symmetric) or `+` (asymmetric):
///    `&x.38.x.14.x.1258.x.36.x.14.x.58.x.16.x.78,+12`;
/// 4. a leadhead code (`a`..`m` or `z`, optionally followed by a digit) and a symmetric block,
///    with the code selecting the implicit leadhead change: `b x38x14x1258x36x14x58x16x78`.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct PlaceNotation {
    blocks: Vec<PnBlock>,
}

impl PlaceNotation {
    pub fn parse(s: &str) -> Result<Self, ParseError> {
        let s = s.trim();
        if s.is_empty() {
            return Err(ParseError::Empty);
        }

        // Format 4: a leadhead code followed by the main block
        if let Some((code, rest)) = s.split_once(char::is_whitespace) {
            if is_leadhead_code(code) && !rest.trim().is_empty() {
                let lh_change = leadhead_change_for_code(code)?;
                let main = tokenise_group(&strip_block_prefix(rest).replace(char::is_whitespace, "."))?;
                return Ok(PlaceNotation {
                    blocks: vec![
                        PnBlock { symmetric: true, changes: main },
                        PnBlock { symmetric: false, changes: vec![lh_change] },
                    ],
                });
            }
        }

        // Format 3: comma-separated `&`/`+` blocks
        if s.contains(',') {
            let blocks = s
                .split(',')
                .map(|block| {
                    let block = block.trim();
                    let symmetric = !block.starts_with('+');
                    let body = strip_block_prefix(block).replace(char::is_whitespace, ".");
                    let changes = tokenise_group(&body)?;
                    Ok(PnBlock { symmetric, changes })
                })
                .collect::<Result<Vec<_>, _>>()?;
            return Ok(PlaceNotation { blocks });
        }

        // Formats 1 and 2: whitespace-separated, optionally with an `l`/`lh` marker
        let mut groups = s.split_whitespace().collect_vec();
        let marker = groups
            .iter()
            .position(|g| matches!(g.to_ascii_lowercase().as_str(), "l" | "lh"));
        let lh_groups = match marker {
            Some(idx) => {
                let after = groups.split_off(idx + 1);
                groups.pop(); // drop the marker itself
                after
            }
            None if groups.len() >= 2 => vec![groups.pop().unwrap()],
            None => Vec::new(),
        };

        let main = tokenise_group(&groups.join("."))?;
        let mut blocks = Vec::with_capacity(2);
        if lh_groups.is_empty() {
            // No separate leadhead notation: a single asymmetric block
            blocks.push(PnBlock { symmetric: false, changes: main });
        } else {
            blocks.push(PnBlock { symmetric: true, changes: main });
            blocks.push(PnBlock {
                symmetric: false,
                changes: tokenise_group(&lh_groups.join("."))?,
            });
        }
        Ok(PlaceNotation { blocks })
    }

    /// The expanded sequence of changes, one per row of the lead.
    pub fn changes(&self) -> Vec<Change> {
        let mut out = Vec::new();
        for block in &self.blocks {
            block.expand_into(&mut out);
        }
        out
    }

    /// The highest place made anywhere in this notation.
    pub fn highest_place(&self) -> Option<u8> {
        self.blocks
            .iter()
            .flat_map(|b| &b.changes)
            .filter_map(Change::highest_place)
            .max()
    }

    /// A guess at the [`Stage`] this notation is written for: the highest place made, bumped up
    /// by one when the notation contains a cross and the highest place is odd (accounting for an
    /// omitted final external place).  The guess can be wrong when external places are omitted
    /// throughout; callers should validate it.
    pub fn stage_guess(&self) -> Stage {
        let highest = self.highest_place().unwrap_or(0) as usize;
        let any_cross = self
            .blocks
            .iter()
            .flat_map(|b| &b.changes)
            .any(Change::is_cross);
        let guess = if any_cross && highest % 2 == 1 {
            highest + 1
        } else {
            highest
        };
        Stage::new(guess as u8)
    }

    /// `true` if the expanded lead is an even-length palindrome about its half-lead change, with
    /// a single leadhead change at the end.
    pub fn is_symmetric_lead(&self, stage: Stage) -> bool {
        let changes = self.changes();
        let len = changes.len();
        if len < 2 || len % 2 != 0 {
            return false;
        }
        (0..len - 1).all(|i| changes[i].eq_on(&changes[len - 2 - i], stage))
    }

    /// `true` if places are made only at whole-pull boundaries: the expanded changes alternate
    /// cross, places, cross, places, ...
    pub fn is_right_place(&self, _stage: Stage) -> bool {
        self.changes()
            .iter()
            .enumerate()
            .all(|(i, c)| c.is_cross() == (i % 2 == 0))
    }

    /// `true` if rotating the lead by half its length and reflecting about the middle of the
    /// stage maps the notation to itself (the symmetry of 'double' methods).
    pub fn is_rotationally_symmetric(&self, stage: Stage) -> bool {
        let changes = self.changes();
        let len = changes.len();
        if len % 2 != 0 {
            return false;
        }
        (0..len).all(|i| changes[(i + len / 2) % len].eq_on(&changes[i].mirrored(stage), stage))
    }

    /// Splits a symmetric lead into (first half, second half, leadhead change): `h` changes up
    /// to and including the half-lead change, the `h - 1` mirrored changes, and the final
    /// change.  Returns `None` if the lead isn't symmetric (including odd-length leads, for
    /// which the half-lead reflection is undefined).
    pub fn halves(&self, stage: Stage) -> Option<Halves> {
        if !self.is_symmetric_lead(stage) {
            return None;
        }
        let changes = self.changes();
        let h = changes.len() / 2;
        Some(Halves {
            first: changes[..h].to_vec(),
            second: changes[h..changes.len() - 1].to_vec(),
            lead_end: changes[changes.len() - 1].clone(),
        })
    }
}

impl Display for PlaceNotation {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        for (i, block) in self.blocks.iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            write!(f, "{}", if block.symmetric { '&' } else { '+' })?;
            for (j, change) in block.changes.iter().enumerate() {
                if j > 0 {
                    write!(f, ".")?;
                }
                write!(f, "{}", change)?;
            }
        }
        Ok(())
    }
}

/// The halves of a symmetric lead, as split by [`PlaceNotation::halves`].
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Halves {
    pub first: Vec<Change>,
    pub second: Vec<Change>,
    pub lead_end: Change,
}

/////////////////////
// PARSING HELPERS //
/////////////////////

/// Splits a run of notation (no whitespace, dots optional around crosses) into [`Change`]s.
fn tokenise_group(group: &str) -> Result<Vec<Change>, ParseError> {
    let mut changes = Vec::new();
    let mut current = String::new();
    let mut flush = |current: &mut String, changes: &mut Vec<Change>| -> Result<(), ParseError> {
        if !current.is_empty() {
            changes.push(Change::parse(current)?);
            current.clear();
        }
        Ok(())
    };
    for c in group.chars() {
        match c {
            'x' | 'X' | '-' => {
                flush(&mut current, &mut changes)?;
                changes.push(Change::cross());
            }
            '.' => flush(&mut current, &mut changes)?,
            c if Bell::from_name(c).is_some() => current.push(c),
            c => return Err(ParseError::UnknownChar(c)),
        }
    }
    flush(&mut current, &mut changes)?;
    if changes.is_empty() {
        return Err(ParseError::EmptyBlock);
    }
    Ok(changes)
}

fn strip_block_prefix(block: &str) -> String {
    block
        .trim()
        .trim_start_matches(&['&', '+'][..])
        .trim_start()
        .to_owned()
}

fn is_leadhead_code(token: &str) -> bool {
    let mut chars = token.chars();
    let letter = match chars.next() {
        Some(c) => c.to_ascii_lowercase(),
        None => return false,
    };
    if !(('a'..='m').contains(&letter) || letter == 'z') {
        return false;
    }
    match chars.next() {
        None => true,
        Some(digit) => digit.is_ascii_digit() && chars.next().is_none(),
    }
}

/// The leadhead change implied by a leadhead code: seconds-place for codes `a`..`f`, an external
/// place for `g`..`m`.  Irregular (`z`) methods default to a seconds-place leadhead.
fn leadhead_change_for_code(code: &str) -> Result<Change, ParseError> {
    let letter = code
        .chars()
        .next()
        .ok_or_else(|| ParseError::BadLeadheadCode(code.to_owned()))?
        .to_ascii_lowercase();
    match letter {
        'a'..='f' | 'z' => Ok(Change::from_places(vec![1, 2])),
        'g'..='m' => Ok(Change::from_places(vec![1, 8])),
        _ => Err(ParseError::BadLeadheadCode(code.to_owned())),
    }
}
