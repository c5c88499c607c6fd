use fragvm_core::{Cmp, Func, Mask, Operand, Value, Vec4};

/// Lane-wise arithmetic of the assign family.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Arith {
    Assign,
    Add,
    Sub,
    Mul,
    Div,
}

impl Arith {
    #[inline(always)]
    fn float(self, a: f32, b: f32) -> f32 {
        match self {
            Arith::Assign => b,
            Arith::Add => a + b,
            Arith::Sub => a - b,
            Arith::Mul => a * b,
            Arith::Div => a / b,
        }
    }

    #[inline(always)]
    fn int(self, a: i32, b: i32) -> i32 {
        match self {
            Arith::Assign => b,
            Arith::Add => a.wrapping_add(b),
            Arith::Sub => a.wrapping_sub(b),
            Arith::Mul => a.wrapping_mul(b),
            Arith::Div => a.checked_div(b).unwrap_or(0),
        }
    }
}

/// Combines the current destination value with a source operand and returns the
/// value to store.
///
/// * a full vector destination takes the source lanes in ascending order; a plain
///   assignment of fewer than 4 lanes sets the 4th lane to 1.0
/// * a swizzled destination consumes source lanes in ascending order, lanes past
///   the end of the source are left alone
/// * scalar sources are broadcast to every destination lane; a single-lane vector
///   is broadcast only under a swizzled destination
/// * int and bool sources re-tag a scalar slot on assignment
#[inline(always)]
pub fn combine(op: Arith, old: Value, mask: Option<Mask>, src: Operand) -> Value {
    match (old, mask) {
        (_, Some(mask)) => Value::Vec(masked(op, old.as_vec4(), mask, src)),
        (Value::Vec(v), None) => Value::Vec(full(op, v, src)),
        (old, None) => scalar(op, old, src),
    }
}

#[inline(always)]
fn full(op: Arith, mut v: Vec4, src: Operand) -> Vec4 {
    if src.is_scalar() {
        let s = src.scalar();
        return v.map(|a| op.float(a, s));
    }

    let (lanes, n) = src.packed();

    for i in 0..n {
        v[i] = op.float(v[i], lanes[i]);
    }
    if op == Arith::Assign && n < 4 {
        v.q = 1.0;
    }
    v
}

#[inline(always)]
fn masked(op: Arith, mut v: Vec4, mask: Mask, src: Operand) -> Vec4 {
    let (lanes, n) = src.packed();
    if n <= 1 {
        for lane in mask.lanes() {
            v[lane] = op.float(v[lane], lanes[0]);
        }
        return v;
    }

    for (k, lane) in mask.lanes().take(n).enumerate() {
        v[lane] = op.float(v[lane], lanes[k]);
    }
    v
}

#[inline(always)]
fn scalar(op: Arith, old: Value, src: Operand) -> Value {
    if matches!(src, Operand::Vec(_, mask) if mask.lane_count() > 1) {
        let base = match op {
            Arith::Assign => Vec4::ZERO,
            _ => Vec4::splat(old.as_f32()),
        };
        return Value::Vec(full(op, base, src));
    }
    let src = match src {
        Operand::Vec(..) => Operand::Float(src.scalar()),
        _ => src,
    };

    match (op, old, src) {
        (Arith::Assign, Value::Int(_), Operand::Float(f)) => Value::Int(f as i32),
        (Arith::Assign, Value::Bool(_), Operand::Float(f)) => Value::Bool(f != 0.0),
        (Arith::Assign, _, Operand::Int(i)) => Value::Int(i),
        (Arith::Assign, _, Operand::Bool(b)) => Value::Bool(b),
        (_, Value::Int(a), Operand::Int(b)) => Value::Int(op.int(a, b)),
        _ => Value::Float(op.float(old.as_f32(), src.scalar())),
    }
}

/// Lane count shared by two operands: a single lane pairs with every lane of the other.
#[inline(always)]
fn paired(na: usize, nb: usize) -> usize {
    match (na, nb) {
        (1, n) | (n, 1) => n,
        (a, b) => a.min(b),
    }
}

#[inline(always)]
fn lane(values: &[f32; 4], n: usize, i: usize) -> f32 {
    if n <= 1 { values[0] } else { values[i] }
}

/// Per-lane comparison reduced with a logical AND.
#[inline(always)]
pub fn compare(cmp: Cmp, lhs: Operand, rhs: Operand) -> bool {
    let (a, na) = lhs.packed();
    let (b, nb) = rhs.packed();
    (0..paired(na, nb)).all(|i| cmp.test(lane(&a, na, i), lane(&b, nb, i)))
}

fn map(src: Operand, f: impl Fn(f32) -> f32) -> Operand {
    match src {
        Operand::Vec(v, mask) => Operand::Vec(v.map(f), mask),
        _ => Operand::Float(f(src.scalar())),
    }
}

fn zip(a: Operand, b: Operand, f: impl Fn(f32, f32) -> f32) -> Operand {
    if a.is_scalar() && b.is_scalar() {
        return Operand::Float(f(a.scalar(), b.scalar()));
    }

    let (pa, na) = a.packed();
    let (pb, nb) = b.packed();
    let n = paired(na, nb);
    let mut out = Vec4::ZERO;
    for i in 0..n {
        out[i] = f(lane(&pa, na, i), lane(&pb, nb, i));
    }
    Operand::Vec(out, Mask::first(n))
}

fn sign(x: f32) -> f32 {
    if x > 0.0 {
        1.0
    } else if x < 0.0 {
        -1.0
    } else {
        x
    }
}

/// Evaluates a math builtin. The result is assigned to the destination by the caller.
///
/// `src2` is the second operand of two-argument builtins, `None` when it could not
/// be read. Clamp is handled by [`clamp`] since it reads the destination.
#[inline(always)]
pub fn call(func: Func, src: Operand, src2: Option<Operand>) -> Option<Operand> {
    Some(match func {
        Func::Sin => map(src, f32::sin),
        Func::Cos => map(src, f32::cos),
        Func::Tan => map(src, f32::tan),
        Func::Asin => map(src, f32::asin),
        Func::Acos => map(src, f32::acos),
        Func::Atan => map(src, f32::atan),
        Func::Exp => map(src, f32::exp),
        Func::Log => map(src, f32::ln),
        Func::Exp2 => map(src, f32::exp2),
        Func::Log2 => map(src, f32::log2),
        Func::Floor => map(src, f32::floor),
        Func::Ceil => map(src, f32::ceil),
        Func::Fract => map(src, |x| x - x.floor()),
        Func::Sign => map(src, sign),
        Func::Abs => map(src, f32::abs),
        Func::Sqrt => map(src, f32::sqrt),
        Func::InverseSqrt => map(src, |x| 1.0 / x.sqrt()),

        Func::Normalize => match src {
            Operand::Vec(..) => {
                let (lanes, n) = src.packed();
                let mut v = Vec4::from(lanes);
                v.normalize(n.min(3));
                Operand::Vec(v, Mask::first(n))
            }
            _ => map(src, sign),
        },
        Func::Length => Operand::Float(src.full().length3()),

        Func::Pow => zip(src, src2?, f32::powf),
        Func::Mod => zip(src, src2?, |x, y| x - y * (x / y).floor()),
        Func::Min => zip(src, src2?, f32::min),
        Func::Max => zip(src, src2?, f32::max),
        Func::Atan2 => zip(src, src2?, f32::atan2),
        Func::Distance => {
            let d = src.full().zip(src2?.full(), |a, b| a - b);
            Operand::Float(d.length3())
        }
        Func::Dot => Operand::Float(src.full().dot3(src2?.full())),
        Func::Cross => Operand::Vec(src.full().cross3(src2?.full()), Mask::XYZ),

        Func::Clamp => return None,
    })
}

/// `dst = clamp(dst, lower, upper)` over the destination lanes.
///
/// Written as max-then-min so an inverted range never panics.
pub fn clamp(old: Value, mask: Option<Mask>, lower: Operand, upper: Operand) -> Value {
    let (lo, nlo) = lower.packed();
    let (hi, nhi) = upper.packed();
    let bound = |x: f32, k: usize| {
        let x = if nlo <= 1 || k < nlo { x.max(lane(&lo, nlo, k)) } else { x };
        if nhi <= 1 || k < nhi { x.min(lane(&hi, nhi, k)) } else { x }
    };

    match (old, mask) {
        (_, Some(mask)) => {
            let mut v = old.as_vec4();
            for (k, l) in mask.lanes().enumerate() {
                v[l] = bound(v[l], k);
            }
            Value::Vec(v)
        }
        (Value::Vec(mut v), None) => {
            for k in 0..4 {
                v[k] = bound(v[k], k);
            }
            Value::Vec(v)
        }
        (Value::Int(i), None) => Value::Int(bound(i as f32, 0) as i32),
        (old, None) => Value::Float(bound(old.as_f32(), 0)),
    }
}

/// `dst = M * dst`, lane for lane.
pub fn transform(old: Value, mask: Option<Mask>, result: impl FnOnce(Vec4) -> Vec4) -> Value {
    let v = old.as_vec4();
    let r = result(v);
    match mask {
        Some(mask) => {
            let mut out = v;
            for l in mask.lanes() {
                out[l] = r[l];
            }
            Value::Vec(out)
        }
        None => Value::Vec(r),
    }
}
