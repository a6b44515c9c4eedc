//! Reversible postfix expression histories.
//!
//! An [`Expression`] is an ordered sequence of [`Element`]s — literal
//! [`Scalar`]s and [`Operator`]s — applied against a pre-pushed initial
//! value. It can run forward ([`Expression::apply`]), compute its own
//! inverse program ([`Expression::reverse`]), and grow incrementally
//! through [`Expression::append`], which opportunistically fuses adjacent
//! same-group operators so a long chain of `+`/`-`/`*`/`/` doesn't grow one
//! element per operation.
//!
//! An `Expression` can also sit in a *packed* state — a string or raw byte
//! form it hasn't parsed yet — so a value that crossed the wire and is
//! never actually read pays no parsing cost (see [`Expression::is_packed`]).

use crate::config;
use crate::error::{Result, SltError};
use crate::operator::Operator;
use crate::value::{Scalar, WireTag};

/// One slot in an [`Expression`]'s history: either a literal value pushed
/// onto the stack, or an operator consuming some of it.
#[derive(Debug, Clone, PartialEq)]
pub enum Element {
    Value(Scalar),
    Op(Operator),
}

#[derive(Debug, Clone)]
enum Packed {
    Str(String),
    Bytes { elements: Vec<u8>, data: Vec<u8> },
}

/// A reversible postfix program over the scalar types in [`crate::value`].
#[derive(Debug, Clone)]
pub struct Expression {
    history: Vec<Element>,
    packed: Option<Packed>,
}

impl Default for Expression {
    fn default() -> Self {
        Self::new()
    }
}

impl Expression {
    /// An empty, already-unpacked expression — the identity function.
    #[must_use]
    pub const fn new() -> Self {
        Self { history: Vec::new(), packed: None }
    }

    /// Builds an expression directly from its element sequence, skipping
    /// the packed state entirely.
    #[must_use]
    pub const fn from_elements(history: Vec<Element>) -> Self {
        Self { history, packed: None }
    }

    /// Builds a packed expression from its string form. Parsing is deferred
    /// until [`Expression::unpack`] is called (directly, or implicitly by
    /// any method that needs the element sequence).
    #[must_use]
    pub const fn from_string(raw: String) -> Self {
        Self { history: Vec::new(), packed: Some(Packed::Str(raw)) }
    }

    /// Builds a packed expression from already-decompressed wire arrays.
    /// See [`crate::codec`] for the compression framing above this layer.
    #[must_use]
    pub const fn from_raw_arrays(elements: Vec<u8>, data: Vec<u8>) -> Self {
        Self { history: Vec::new(), packed: Some(Packed::Bytes { elements, data }) }
    }

    /// Whether this expression still holds an unparsed string or byte form.
    #[must_use]
    pub const fn is_packed(&self) -> bool {
        self.packed.is_some()
    }

    /// Parses the packed form into the element sequence, if any. Idempotent.
    pub fn unpack(&mut self) {
        let Some(packed) = self.packed.take() else { return };
        match packed {
            Packed::Str(s) => self.history = parse_string_form(&s),
            Packed::Bytes { elements, data } => self.history = parse_raw_arrays(&elements, &data),
        }
    }

    fn history(&mut self) -> &[Element] {
        self.unpack();
        &self.history
    }

    /// Number of elements, forcing an unpack if still packed.
    #[must_use]
    pub fn len(&mut self) -> usize {
        self.history().len()
    }

    /// Cheap truthiness check. Mirrors the Python original's fast path:
    /// a still-packed, non-empty raw form is truthy without forcing a
    /// parse; otherwise falls back to the unpacked length.
    #[must_use]
    pub fn is_empty(&mut self) -> bool {
        match &self.packed {
            Some(Packed::Str(s)) if !s.is_empty() => return false,
            Some(Packed::Bytes { elements, data }) if !elements.is_empty() || !data.is_empty() => return false,
            _ => {}
        }
        self.len() == 0
    }

    /// Evaluates the program with `x` pre-pushed on an otherwise empty
    /// stack. Operators without enough stack depth are silently skipped,
    /// so a partial or mismatched-arity history never panics.
    ///
    /// # Errors
    /// Returns [`SltError::InversionImpossible`] on division by zero, and
    /// [`SltError::Schema`] if the history is empty or applies a unary
    /// operator to a non-numeric value.
    pub fn apply(&mut self, x: Scalar) -> Result<Scalar> {
        let mut stack = vec![x];
        for element in self.history() {
            match element {
                Element::Value(v) => stack.push(v.clone()),
                Element::Op(op) => {
                    if stack.len() < op.arg_count() {
                        continue;
                    }
                    match *op {
                        Operator::Swap => {
                            let top = stack.len() - 1;
                            stack.swap(top, top - 1);
                        }
                        Operator::Sin | Operator::Cos | Operator::Asin | Operator::Acos => {
                            let a = stack.pop().expect("checked arg_count above");
                            stack.push(eval_unary(*op, &a)?);
                        }
                        _ => {
                            let b = stack.pop().expect("checked arg_count above");
                            let a = stack.pop().expect("checked arg_count above");
                            stack.push(eval_binary(*op, &a, &b)?);
                        }
                    }
                }
            }
        }
        stack.pop().ok_or_else(|| SltError::Schema("expression produced no value".into()))
    }

    /// Builds the expression that computes this one's inverse function. A
    /// direct port of the original source's part-segmenting walk: it
    /// re-derives, element by element, whether a commutative operator's
    /// inverse needs a leading swap, and whether a non-commutative operator
    /// should be emitted inverted or as-is depending on whether a `swap`
    /// already flipped its operand order.
    #[must_use]
    pub fn reverse(&mut self) -> Self {
        let history = self.history();
        let mut part: Vec<Element> = Vec::new();
        let mut parts: Vec<Vec<Element>> = Vec::new();
        let mut swap_mode = false;

        for element in history {
            match element {
                Element::Value(v) => {
                    part.push(Element::Value(v.clone()));
                    swap_mode = false;
                }
                Element::Op(op) => {
                    if *op == Operator::Swap {
                        part.push(Element::Op(Operator::Swap));
                        swap_mode = true;
                    } else if op.commutative() {
                        if swap_mode {
                            part.push(Element::Op(Operator::Swap));
                        }
                        part.push(Element::Op(op.inverse()));
                        swap_mode = false;
                    } else {
                        part.push(Element::Op(if swap_mode { *op } else { op.inverse() }));
                        swap_mode = false;
                    }
                    if !swap_mode {
                        parts.push(std::mem::take(&mut part));
                    }
                }
            }
        }
        if !part.is_empty() {
            parts.push(part);
        }

        parts.reverse();
        Self::from_elements(parts.into_iter().flatten().collect())
    }

    /// Appends `(operand, [swap,] operator)` to the history, applying the
    /// neutral-absorption and group-fusion simplifications of the
    /// simplification pass when `expr_chain` is enabled in the process
    /// configuration. With simplification disabled this is plain
    /// concatenation.
    pub fn append(&mut self, operand: Scalar, swap: bool, op: Operator) {
        self.unpack();
        let mut buffer = vec![Element::Value(operand)];
        if swap {
            buffer.push(Element::Op(Operator::Swap));
        }
        buffer.push(Element::Op(op));
        append_buffer(&mut self.history, buffer);
    }

    /// Appends a bare unary operator with no operand (`sin`/`cos`/`asin`/
    /// `acos`), the buffer shape the original source builds for those four
    /// operators. Unary operators never report a fusible `group`, so this
    /// is always a plain append.
    pub fn append_op(&mut self, op: Operator) {
        self.unpack();
        append_buffer(&mut self.history, vec![Element::Op(op)]);
    }

    /// Renders the string form: `;`-separated literal tokens and operator
    /// glyphs. Forces an unpack unless the expression is already packed as
    /// a string, in which case the packed form is returned verbatim.
    #[must_use]
    pub fn to_string_form(&mut self) -> String {
        if let Some(Packed::Str(s)) = &self.packed {
            return s.clone();
        }
        self.history()
            .iter()
            .map(|el| match el {
                Element::Value(v) => v.to_token(),
                Element::Op(op) => op.glyph().to_owned(),
            })
            .collect::<Vec<_>>()
            .join(";")
    }

    /// Decomposes the element sequence into the wire's typed `elements`
    /// and `data` byte arrays (see the codec's framing above this). Forces
    /// an unpack.
    #[must_use]
    pub fn to_raw_arrays(&mut self) -> (Vec<u8>, Vec<u8>) {
        let mut elements = Vec::new();
        let mut data = Vec::new();
        for element in self.history() {
            match element {
                Element::Op(op) => elements.push(op.code() + 64),
                Element::Value(v) => {
                    elements.push(v.wire_tag() as u8);
                    encode_literal(v, &mut data);
                }
            }
        }
        (elements, data)
    }
}

/// Evaluates a single unary operator directly, without recording it to any
/// history. [`crate::tracked::Tracked`] uses this to compute a trig
/// operator's result before appending it to its location's expression.
///
/// # Errors
/// See [`Expression::apply`].
pub fn eval_unary_op(op: Operator, a: &Scalar) -> Result<Scalar> {
    eval_unary(op, a)
}

/// Evaluates a single binary operator directly, without recording it to
/// any history. [`crate::tracked::Tracked`] uses this to compute an
/// arithmetic result before appending it to its location's expression.
///
/// # Errors
/// See [`Expression::apply`].
pub fn eval_binary_op(op: Operator, a: &Scalar, b: &Scalar) -> Result<Scalar> {
    eval_binary(op, a, b)
}

fn eval_unary(op: Operator, a: &Scalar) -> Result<Scalar> {
    let v = a.as_f64().ok_or_else(|| SltError::Schema("trig operator applied to a non-numeric value".into()))?;
    Ok(Scalar::Float(match op {
        Operator::Sin => v.sin(),
        Operator::Cos => v.cos(),
        Operator::Asin => v.asin(),
        Operator::Acos => v.acos(),
        _ => unreachable!("eval_unary only called for trig operators"),
    }))
}

fn eval_binary(op: Operator, a: &Scalar, b: &Scalar) -> Result<Scalar> {
    match op {
        Operator::Swap => unreachable!("swap has no value-level binary form"),
        Operator::Add => Ok(match (a, b) {
            (Scalar::Str(x), Scalar::Str(y)) => Scalar::Str(format!("{x}{y}")),
            _ => numeric_add(a, b),
        }),
        Operator::Sub => match a {
            Scalar::Str(s) => Ok(Scalar::Str(truncate_right(s, string_len_of(b)?))),
            _ => numeric_sub(a, b),
        },
        Operator::MulInt | Operator::Mul => match string_operand(a, b) {
            Some((s, count)) => Ok(Scalar::Str(repeat_string(s, count))),
            None => Ok(numeric_mul(op, a, b)),
        },
        Operator::Div | Operator::DivFloor => match a {
            Scalar::Str(s) => {
                let divisor = numeric_i64(b)?;
                if divisor == 0 {
                    return Err(SltError::InversionImpossible);
                }
                let new_len = (s.chars().count() as i64 / divisor).max(0) as usize;
                Ok(Scalar::Str(truncate_to(s, new_len)))
            }
            _ => numeric_div(op, a, b),
        },
        Operator::Pow => numeric_pow(a, b),
        Operator::Ipow => numeric_ipow(a, b),
        Operator::Sin | Operator::Cos | Operator::Asin | Operator::Acos => {
            unreachable!("trig operators are unary")
        }
    }
}

fn both_int(a: &Scalar, b: &Scalar) -> bool {
    matches!(a, Scalar::Int32(_) | Scalar::Int64(_)) && matches!(b, Scalar::Int32(_) | Scalar::Int64(_))
}

fn to_i64(s: &Scalar) -> Option<i64> {
    match s {
        Scalar::Int32(v) => Some(i64::from(*v)),
        Scalar::Int64(v) => Some(*v),
        _ => None,
    }
}

fn as_complex(s: &Scalar) -> Option<(f64, f64)> {
    match s {
        Scalar::Complex(re, im) => Some((*re, *im)),
        _ => s.as_f64().map(|v| (v, 0.0)),
    }
}

fn numeric_add(a: &Scalar, b: &Scalar) -> Scalar {
    if both_int(a, b) {
        return Scalar::int_narrow(to_i64(a).unwrap_or_default() + to_i64(b).unwrap_or_default());
    }
    if matches!(a, Scalar::Complex(..)) || matches!(b, Scalar::Complex(..)) {
        if let (Some((ar, ai)), Some((br, bi))) = (as_complex(a), as_complex(b)) {
            return Scalar::Complex(ar + br, ai + bi);
        }
    }
    Scalar::Float(a.as_f64().unwrap_or_default() + b.as_f64().unwrap_or_default())
}

fn numeric_sub(a: &Scalar, b: &Scalar) -> Result<Scalar> {
    if both_int(a, b) {
        return Ok(Scalar::int_narrow(to_i64(a).unwrap_or_default() - to_i64(b).unwrap_or_default()));
    }
    if matches!(a, Scalar::Complex(..)) || matches!(b, Scalar::Complex(..)) {
        if let (Some((ar, ai)), Some((br, bi))) = (as_complex(a), as_complex(b)) {
            return Ok(Scalar::Complex(ar - br, ai - bi));
        }
    }
    let (af, bf) = (a.as_f64(), b.as_f64());
    match (af, bf) {
        (Some(af), Some(bf)) => Ok(Scalar::Float(af - bf)),
        _ => Err(SltError::Schema("subtraction requires numeric or string operands".into())),
    }
}

fn numeric_mul(op: Operator, a: &Scalar, b: &Scalar) -> Scalar {
    if matches!(op, Operator::MulInt) || both_int(a, b) {
        return Scalar::int_narrow(to_i64(a).unwrap_or_default() * to_i64(b).unwrap_or_default());
    }
    if matches!(a, Scalar::Complex(..)) || matches!(b, Scalar::Complex(..)) {
        if let (Some((ar, ai)), Some((br, bi))) = (as_complex(a), as_complex(b)) {
            return Scalar::Complex(ar * br - ai * bi, ar * bi + ai * br);
        }
    }
    Scalar::Float(a.as_f64().unwrap_or_default() * b.as_f64().unwrap_or_default())
}

fn numeric_div(op: Operator, a: &Scalar, b: &Scalar) -> Result<Scalar> {
    let bf = b.as_f64().ok_or_else(|| SltError::Schema("division requires a numeric divisor".into()))?;
    if bf == 0.0 {
        return Err(SltError::InversionImpossible);
    }
    let af = a.as_f64().ok_or_else(|| SltError::Schema("division requires a numeric dividend".into()))?;
    if matches!(op, Operator::DivFloor) {
        Ok(Scalar::int_narrow((af / bf).floor() as i64))
    } else {
        Ok(Scalar::Float(af / bf))
    }
}

fn numeric_pow(a: &Scalar, b: &Scalar) -> Result<Scalar> {
    let (af, bf) = (
        a.as_f64().ok_or_else(|| SltError::Schema("pow requires numeric operands".into()))?,
        b.as_f64().ok_or_else(|| SltError::Schema("pow requires numeric operands".into()))?,
    );
    Ok(Scalar::Float(af.powf(bf)))
}

fn numeric_ipow(a: &Scalar, b: &Scalar) -> Result<Scalar> {
    let (af, bf) = (
        a.as_f64().ok_or_else(|| SltError::Schema("ipow requires numeric operands".into()))?,
        b.as_f64().ok_or_else(|| SltError::Schema("ipow requires numeric operands".into()))?,
    );
    if bf == 0.0 {
        return Err(SltError::InversionImpossible);
    }
    Ok(Scalar::Float(af.powf(1.0 / bf)))
}

fn string_operand<'a>(a: &'a Scalar, b: &'a Scalar) -> Option<(&'a str, i64)> {
    match (a, b) {
        (Scalar::Str(s), other) => to_i64(other).map(|n| (s.as_str(), n)),
        (other, Scalar::Str(s)) => to_i64(other).map(|n| (s.as_str(), n)),
        _ => None,
    }
}

fn string_len_of(b: &Scalar) -> Result<usize> {
    match b {
        Scalar::Str(s) => Ok(s.chars().count()),
        other => other
            .as_f64()
            .map(|f| f.max(0.0) as usize)
            .ok_or_else(|| SltError::Schema("cannot take the length of this operand".into())),
    }
}

fn numeric_i64(s: &Scalar) -> Result<i64> {
    s.as_f64().map(|f| f as i64).ok_or_else(|| SltError::Schema("expected a numeric operand".into()))
}

fn truncate_right(s: &str, cut: usize) -> String {
    let total = s.chars().count();
    let keep = total.saturating_sub(cut);
    s.chars().take(keep).collect()
}

fn truncate_to(s: &str, len: usize) -> String {
    s.chars().take(len).collect()
}

fn repeat_string(s: &str, n: i64) -> String {
    if n <= 0 {
        String::new()
    } else {
        s.repeat(n as usize)
    }
}

/// The recursive simplification pass from the original `_append`, ported
/// as a loop over successive suffixes of `buffer`. `buffer` is always
/// shaped `(operand, [swap,] operator)` when built by
/// [`Expression::append`]; the loop structure tolerates a longer buffer for
/// fidelity with the source algorithm, though nothing in this crate builds
/// one.
fn append_buffer(history: &mut Vec<Element>, mut buffer: Vec<Element>) {
    loop {
        if buffer.is_empty() {
            return;
        }
        if config::config().expr_chain && buffer.len() > 1 {
            let new_swap = matches!(buffer[1], Element::Op(Operator::Swap));
            let op_new_index = 1 + usize::from(new_swap);
            let op_new = match buffer.get(op_new_index) {
                Some(Element::Op(op)) => *op,
                _ => {
                    history.extend(buffer);
                    return;
                }
            };
            let operand = match &buffer[0] {
                Element::Value(v) => v.clone(),
                Element::Op(_) => {
                    history.extend(buffer);
                    return;
                }
            };

            // Neutral absorption: dropping a no-op step.
            if !new_swap || op_new.commutative() {
                if let Some(neutral) = op_new.neutral() {
                    if operand.equals_neutral(neutral) {
                        buffer.drain(..=op_new_index);
                        continue;
                    }
                }
            }

            if history.len() > 1 {
                if let Element::Op(op_chain) = &history[history.len() - 1] {
                    let op_chain = *op_chain;
                    if op_chain.group().is_some() {
                        let prev_is_swap = matches!(history[history.len() - 2], Element::Op(Operator::Swap));
                        let prev_is_op = matches!(history[history.len() - 2], Element::Op(_));
                        if (prev_is_swap || !prev_is_op) && op_new.group() == op_chain.group() {
                            let chain_swap = prev_is_swap;
                            let chain_operand = match &history[history.len() - if chain_swap { 3 } else { 2 }] {
                                Element::Value(v) => v.clone(),
                                Element::Op(_) => {
                                    history.extend(buffer);
                                    return;
                                }
                            };

                            let (a, b) = if new_swap { (operand.clone(), chain_operand.clone()) } else { (chain_operand.clone(), operand.clone()) };
                            let fuse_op = if chain_swap || op_chain.commutative() { op_new } else { op_new.inverse() };
                            let fused = match eval_binary(fuse_op, &a, &b) {
                                Ok(v) => v,
                                Err(_) => {
                                    history.extend(buffer);
                                    return;
                                }
                            };

                            if chain_swap {
                                history.truncate(history.len() - 3);
                            } else {
                                history.truncate(history.len() - 2);
                            }
                            history.push(Element::Value(fused));
                            if chain_swap || new_swap {
                                history.push(Element::Op(Operator::Swap));
                            }

                            let tail_op = if new_swap {
                                if chain_swap && op_chain.negate() {
                                    op_new.inverse()
                                } else {
                                    op_new
                                }
                            } else {
                                op_chain
                            };
                            history.push(Element::Op(tail_op));

                            let fused_again = if chain_swap || new_swap {
                                tail_op.commutative() && tail_op.neutral().is_some_and(|n| fused.equals_neutral(n))
                            } else {
                                tail_op.neutral().is_some_and(|n| fused.equals_neutral(n))
                            };
                            if fused_again {
                                let drop = if chain_swap || new_swap { 3 } else { 2 };
                                history.truncate(history.len() - drop);
                            }

                            if op_new_index + 1 < buffer.len() {
                                buffer.drain(..=op_new_index);
                                continue;
                            }
                            return;
                        }
                    }
                }
            }
        }
        history.extend(buffer);
        return;
    }
}

fn parse_string_form(raw: &str) -> Vec<Element> {
    raw.split(';')
        .filter(|part| !part.is_empty())
        .map(|part| match Operator::from_glyph(part) {
            Some(op) => Element::Op(op),
            None => Scalar::from_token(part).map_or_else(|| Element::Value(Scalar::Str(part.to_owned())), Element::Value),
        })
        .collect()
}

fn encode_literal(value: &Scalar, data: &mut Vec<u8>) {
    match value {
        Scalar::Int32(v) => data.extend_from_slice(&v.to_le_bytes()),
        Scalar::Int64(v) => data.extend_from_slice(&v.to_le_bytes()),
        Scalar::Float(v) => data.extend_from_slice(&v.to_le_bytes()),
        Scalar::Complex(re, im) => {
            data.extend_from_slice(&re.to_le_bytes());
            data.extend_from_slice(&im.to_le_bytes());
        }
        Scalar::Str(s) => {
            let bytes = s.as_bytes();
            data.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
            data.extend_from_slice(bytes);
        }
    }
}

fn parse_raw_arrays(elements: &[u8], data: &[u8]) -> Vec<Element> {
    let mut history = Vec::with_capacity(elements.len());
    let mut cursor = 0usize;
    for &tag in elements {
        if tag >= 64 {
            if let Some(op) = Operator::from_code(tag - 64) {
                history.push(Element::Op(op));
            }
            continue;
        }
        let value = match tag {
            t if t == WireTag::Int32 as u8 => {
                let bytes: [u8; 4] = data[cursor..cursor + 4].try_into().unwrap_or_default();
                cursor += 4;
                Scalar::Int32(i32::from_le_bytes(bytes))
            }
            t if t == WireTag::Int64 as u8 => {
                let bytes: [u8; 8] = data[cursor..cursor + 8].try_into().unwrap_or_default();
                cursor += 8;
                Scalar::Int64(i64::from_le_bytes(bytes))
            }
            t if t == WireTag::Double as u8 => {
                let bytes: [u8; 8] = data[cursor..cursor + 8].try_into().unwrap_or_default();
                cursor += 8;
                Scalar::Float(f64::from_le_bytes(bytes))
            }
            t if t == WireTag::Complex as u8 => {
                let re_bytes: [u8; 8] = data[cursor..cursor + 8].try_into().unwrap_or_default();
                let im_bytes: [u8; 8] = data[cursor + 8..cursor + 16].try_into().unwrap_or_default();
                cursor += 16;
                Scalar::Complex(f64::from_le_bytes(re_bytes), f64::from_le_bytes(im_bytes))
            }
            t if t == WireTag::Str as u8 => {
                let len_bytes: [u8; 4] = data[cursor..cursor + 4].try_into().unwrap_or_default();
                let len = u32::from_le_bytes(len_bytes) as usize;
                cursor += 4;
                let s = String::from_utf8_lossy(&data[cursor..cursor + len]).into_owned();
                cursor += len;
                Scalar::Str(s)
            }
            _ => continue,
        };
        history.push(Element::Value(value));
    }
    history
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{with_config, Config};
    use pretty_assertions::assert_eq;

    fn chained_config() -> Config {
        Config { expr_chain: true, ..Config::default() }
    }

    #[test]
    fn scenario_integer_chain() {
        with_config(chained_config(), || {
            let mut expr = Expression::new();
            expr.append(Scalar::Int32(3), false, Operator::Add);
            expr.append(Scalar::Int32(2), false, Operator::Mul);
            expr.append(Scalar::Int32(1), false, Operator::Sub);

            assert_eq!(expr.clone().apply(Scalar::Int32(5)).unwrap(), Scalar::Int32(17));
            let mut rev = expr.reverse();
            assert_eq!(rev.apply(Scalar::Int32(17)).unwrap(), Scalar::Int32(5));
        });
    }

    #[test]
    fn scenario_float_with_trig() {
        with_config(chained_config(), || {
            let mut expr = Expression::new();
            expr.append(Scalar::Float(0.2), false, Operator::Add);
            expr.history.push(Element::Op(Operator::Sin));

            let raw = expr.clone().apply(Scalar::Float(0.3)).unwrap();
            let Scalar::Float(raw) = raw else { panic!("expected float") };
            assert!((raw - (0.3_f64 + 0.2).sin()).abs() < 1e-9);

            let mut rev = expr.reverse();
            let back = rev.apply(Scalar::Float(raw)).unwrap();
            let Scalar::Float(back) = back else { panic!("expected float") };
            assert!((back - 0.3).abs() < 1e-6);
        });
    }

    #[test]
    fn scenario_string_length_arithmetic() {
        with_config(chained_config(), || {
            let mut expr = Expression::new();
            expr.append(Scalar::Str("string".into()), false, Operator::Add);
            expr.append(Scalar::Int32(3), true, Operator::Mul);

            let raw = expr.clone().apply(Scalar::Str("test".into())).unwrap();
            assert_eq!(raw, Scalar::Str("teststringteststringteststring".into()));

            let mut rev = expr.reverse();
            let back = rev.apply(raw).unwrap();
            assert_eq!(back, Scalar::Str("test".into()));
        });
    }

    #[test]
    fn neutral_element_is_absorbed() {
        with_config(chained_config(), || {
            let mut expr = Expression::new();
            expr.append(Scalar::Int32(0), false, Operator::Add);
            assert_eq!(expr.len(), 0);
        });
    }

    #[test]
    fn same_group_additions_fuse_into_one_element() {
        with_config(chained_config(), || {
            let mut expr = Expression::new();
            expr.append(Scalar::Int32(2), false, Operator::Add);
            expr.append(Scalar::Int32(3), false, Operator::Add);
            assert_eq!(expr.len(), 2);
            assert_eq!(expr.clone().apply(Scalar::Int32(10)).unwrap(), Scalar::Int32(15));
        });
    }

    #[test]
    fn mul_int_and_div_floor_never_fuse_with_mul_or_div() {
        with_config(chained_config(), || {
            let mut expr = Expression::new();
            expr.append(Scalar::Int32(2), false, Operator::MulInt);
            expr.append(Scalar::Float(1.5), false, Operator::Mul);
            assert_eq!(expr.len(), 4);
        });
    }

    #[test]
    fn expr_chain_disabled_is_plain_concatenation() {
        with_config(Config { expr_chain: false, ..Config::default() }, || {
            let mut expr = Expression::new();
            expr.append(Scalar::Int32(0), false, Operator::Add);
            expr.append(Scalar::Int32(2), false, Operator::Add);
            assert_eq!(expr.len(), 4);
        });
    }

    #[test]
    fn string_form_round_trips() {
        with_config(chained_config(), || {
            let mut expr = Expression::new();
            expr.append(Scalar::Int32(3), false, Operator::Add);
            expr.append(Scalar::Float(1.5), false, Operator::Mul);
            let s = expr.to_string_form();
            let mut reparsed = Expression::from_string(s);
            assert_eq!(reparsed.apply(Scalar::Int32(2)).unwrap(), expr.apply(Scalar::Int32(2)).unwrap());
        });
    }

    #[test]
    fn binary_form_round_trips() {
        with_config(chained_config(), || {
            let mut expr = Expression::new();
            expr.append(Scalar::Int32(3), false, Operator::Add);
            expr.append(Scalar::Str("x".into()), true, Operator::Sub);
            let (elements, data) = expr.to_raw_arrays();
            let mut reparsed = Expression::from_raw_arrays(elements, data);
            assert_eq!(reparsed.apply(Scalar::Str("hello".into())).unwrap(), expr.apply(Scalar::Str("hello".into())).unwrap());
        });
    }

    #[test]
    fn lazy_unpack_reports_packed_until_touched() {
        let mut expr = Expression::from_string("1;+".to_owned());
        assert!(expr.is_packed());
        let _ = expr.apply(Scalar::Int32(1));
        assert!(!expr.is_packed());
    }
}
