use fragvm_core::{
    AnchorCache, Builtin, FragmentContext, FragmentOutput, Interpolator, Stage, Value, Vec4, VertexAttrib,
    VertexContext,
};

/// Writable view of a built-in field.
pub enum BuiltinMut<'a> {
    Vec(&'a mut Vec4),
    Scalar(&'a mut f32),
}

/// An invocation record the interpreter runs against: a fragment or a vertex.
pub trait Invocation {
    const STAGE: Stage;

    /// Current value of a built-in. Built-ins of the other stage read as zero.
    fn builtin(&self, builtin: Builtin) -> Value;

    /// Writable view of a built-in, `None` when read-only.
    ///
    /// Taking the view of a color output also tags the output color model.
    fn builtin_mut(&mut self, builtin: Builtin) -> Option<BuiltinMut<'_>>;

    /// Screen or input position, for diagnostics.
    fn position(&self) -> [f32; 2];

    fn interpolate(&self, _interp: &Interpolator, _cache: &mut AnchorCache) -> Option<Vec4> {
        None
    }

    fn attribute(&self, _attrib: &VertexAttrib) -> Option<Vec4> {
        None
    }

    fn discard(&mut self) {}
}

impl Invocation for FragmentContext {
    const STAGE: Stage = Stage::Fragment;

    #[inline(always)]
    fn builtin(&self, builtin: Builtin) -> Value {
        match builtin {
            Builtin::FragRgba | Builtin::FragYuva => Value::Vec(self.color),
            Builtin::FragX => Value::Float(self.x),
            Builtin::FragY => Value::Float(self.y),
            Builtin::FragZ => Value::Float(self.z),
            Builtin::FragDepth => Value::Float(self.depth),
            Builtin::FragW => Value::Float(self.persp_denom),
            Builtin::TexCoord => Value::Vec(Vec4::new(
                self.x / self.surface[0].max(1) as f32,
                self.y / self.surface[1].max(1) as f32,
                0.0,
                0.0,
            )),
            Builtin::TexCoordScreen => Value::Vec(Vec4::new(self.x, self.y, 0.0, 0.0)),
            Builtin::FragOdd => Value::Bool(self.odd),
            Builtin::PrimIdx => Value::Int(self.prim_index as i32),
            Builtin::Vertex | Builtin::VertexOut | Builtin::VertexIdx => Value::default(),
        }
    }

    #[inline(always)]
    fn builtin_mut(&mut self, builtin: Builtin) -> Option<BuiltinMut<'_>> {
        match builtin {
            Builtin::FragRgba => {
                self.output = FragmentOutput::Rgb;
                Some(BuiltinMut::Vec(&mut self.color))
            }
            Builtin::FragYuva => {
                self.output = FragmentOutput::Yuv;
                Some(BuiltinMut::Vec(&mut self.color))
            }
            Builtin::FragDepth => Some(BuiltinMut::Scalar(&mut self.depth)),
            _ => None,
        }
    }

    fn position(&self) -> [f32; 2] {
        [self.x, self.y]
    }

    #[inline(always)]
    fn interpolate(&self, interp: &Interpolator, cache: &mut AnchorCache) -> Option<Vec4> {
        interp.lerp(self, cache)
    }

    fn discard(&mut self) {
        self.output = FragmentOutput::Invalid;
    }
}

impl Invocation for VertexContext {
    const STAGE: Stage = Stage::Vertex;

    #[inline(always)]
    fn builtin(&self, builtin: Builtin) -> Value {
        match builtin {
            Builtin::Vertex => Value::Vec(self.in_vertex),
            Builtin::VertexOut => Value::Vec(self.out_vertex),
            Builtin::VertexIdx => Value::Int(self.vertex_index as i32),
            Builtin::PrimIdx => Value::Int(self.prim_index as i32),
            _ => Value::default(),
        }
    }

    #[inline(always)]
    fn builtin_mut(&mut self, builtin: Builtin) -> Option<BuiltinMut<'_>> {
        match builtin {
            Builtin::VertexOut => Some(BuiltinMut::Vec(&mut self.out_vertex)),
            _ => None,
        }
    }

    fn position(&self) -> [f32; 2] {
        [self.in_vertex.x, self.in_vertex.y]
    }

    #[inline(always)]
    fn attribute(&self, attrib: &VertexAttrib) -> Option<Vec4> {
        attrib.read(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn color_write_tags_output() {
        let mut frag = FragmentContext::new(3.0, 4.0);
        assert!(!frag.is_valid());

        frag.builtin_mut(Builtin::FragYuva);
        assert_eq!(frag.output, FragmentOutput::Yuv);
        assert!(frag.builtin_mut(Builtin::FragX).is_none());

        frag.discard();
        assert!(!frag.is_valid());
    }

    #[test]
    fn tex_coord_is_normalized() {
        let frag = FragmentContext::new(32.0, 16.0).with_surface(64, 64);
        assert_eq!(frag.builtin(Builtin::TexCoord), Value::Vec(Vec4::new(0.5, 0.25, 0.0, 0.0)));
        assert_eq!(frag.builtin(Builtin::TexCoordScreen), Value::Vec(Vec4::new(32.0, 16.0, 0.0, 0.0)));
    }

    #[test]
    fn vertex_builtins() {
        let mut vert = VertexContext::new(Vec4::new(1.0, 2.0, 3.0, 1.0)).with_index(4, 7, 1);
        assert_eq!(vert.builtin(Builtin::VertexIdx), Value::Int(7));
        assert_eq!(vert.builtin(Builtin::PrimIdx), Value::Int(4));

        if let Some(BuiltinMut::Vec(out)) = vert.builtin_mut(Builtin::VertexOut) {
            out.x = 9.0;
        }
        assert_eq!(vert.out_vertex.x, 9.0);
        assert_eq!(vert.in_vertex.x, 1.0);
    }
}
