//! Decodes items in an `LF_FIELDLIST` complex list.

use super::*;
use tracing::error;

/// Represents the data stored within an `LF_FIELDLIST` type record. This can be
/// decoded using the `iter()` method.
#[derive(Clone)]
pub struct FieldList<'a> {
    #[allow(missing_docs)]
    pub bytes: &'a [u8],
}

impl<'a> FieldList<'a> {
    /// Iterates the fields within an `LF_FIELDLIST` type record.
    pub fn iter(&self) -> IterFields<'a> {
        IterFields { bytes: self.bytes }
    }
}

impl<'a> Debug for FieldList<'a> {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        if f.alternate() {
            let mut list = f.debug_list();
            for field in self.iter() {
                list.entry(&field);
            }
            list.finish()
        } else {
            f.write_str("FieldList")
        }
    }
}

/// Iterates the fields within an `LF_FIELDLIST` type record.
pub struct IterFields<'a> {
    #[allow(missing_docs)]
    pub bytes: &'a [u8],
}

/// Represents one field within an `LF_FIELDLIST` type record.
#[derive(Clone, Debug)]
#[allow(missing_docs)]
pub enum Field<'a> {
    BaseClass(BaseClass<'a>),
    DirectVirtualBaseClass(VirtualBaseClass<'a>),
    IndirectVirtualBaseClass(VirtualBaseClass<'a>),
    Enumerate(Enumerate<'a>),
    Index(TypeIndex),
    Member(Member<'a>),
    StaticMember(StaticMember<'a>),
    Method(Method<'a>),
    NestedType(NestedType<'a>),
    VFuncTable(TypeIndex),
    OneMethod(OneMethod<'a>),
}

/// `LF_BCLASS`: a real (non-virtual) base class.
#[derive(Clone, Debug)]
#[allow(missing_docs)]
pub struct BaseClass<'a> {
    pub attr: u16,
    pub ty: TypeIndex,
    pub offset: Number<'a>,
}

impl<'a> Parse<'a> for BaseClass<'a> {
    fn from_parser(p: &mut Parser<'a>) -> Result<Self, ParserError> {
        let attr = p.u16()?;
        let ty = p.type_index()?;
        let offset = p.number()?;
        Ok(BaseClass { attr, ty, offset })
    }
}

/// `LF_VBCLASS` and `LF_IVBCLASS`: a direct or indirect virtual base class.
#[derive(Clone, Debug)]
#[allow(missing_docs)]
pub struct VirtualBaseClass<'a> {
    pub attr: u16,
    pub btype: TypeIndex,
    pub vbtype: TypeIndex,
    pub vbpoff: Number<'a>,
    pub vboff: Number<'a>,
}

impl<'a> Parse<'a> for VirtualBaseClass<'a> {
    fn from_parser(p: &mut Parser<'a>) -> Result<Self, ParserError> {
        Ok(Self {
            attr: p.u16()?,
            btype: p.type_index()?,
            vbtype: p.type_index()?,
            vbpoff: p.number()?,
            vboff: p.number()?,
        })
    }
}

/// `LF_ENUMERATE`: one enumerator, with a numeric value and a name.
#[derive(Clone)]
#[allow(missing_docs)]
pub struct Enumerate<'a> {
    pub attr: u16,
    pub value: Number<'a>,
    pub name: &'a BStr,
}

impl<'a> Parse<'a> for Enumerate<'a> {
    fn from_parser(p: &mut Parser<'a>) -> Result<Self, ParserError> {
        Ok(Self {
            attr: p.u16()?,
            value: p.number()?,
            name: p.strz()?,
        })
    }
}

impl<'a> Debug for Enumerate<'a> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} = {}", self.name, self.value)
    }
}

/// `LF_MEMBER`: a data member.
#[derive(Clone, Debug)]
#[allow(missing_docs)]
pub struct Member<'a> {
    pub attr: u16,
    pub ty: TypeIndex,
    pub offset: Number<'a>,
    pub name: &'a BStr,
}

impl<'a> Parse<'a> for Member<'a> {
    fn from_parser(p: &mut Parser<'a>) -> Result<Self, ParserError> {
        Ok(Self {
            attr: p.u16()?,
            ty: p.type_index()?,
            offset: p.number()?,
            name: p.strz()?,
        })
    }
}

/// `LF_STMEMBER`: a static data member.
#[derive(Clone, Debug)]
#[allow(missing_docs)]
pub struct StaticMember<'a> {
    pub attr: u16,
    pub ty: TypeIndex,
    pub name: &'a BStr,
}

impl<'a> Parse<'a> for StaticMember<'a> {
    fn from_parser(p: &mut Parser<'a>) -> Result<Self, ParserError> {
        Ok(Self {
            attr: p.u16()?,
            ty: p.type_index()?,
            name: p.strz()?,
        })
    }
}

/// `LF_METHOD`: a group of overloaded methods.
#[derive(Clone, Debug)]
#[allow(missing_docs)]
pub struct Method<'a> {
    pub count: u16,
    pub methods: TypeIndex,
    pub name: &'a BStr,
}

impl<'a> Parse<'a> for Method<'a> {
    fn from_parser(p: &mut Parser<'a>) -> Result<Self, ParserError> {
        Ok(Self {
            count: p.u16()?,
            methods: p.type_index()?,
            name: p.strz()?,
        })
    }
}

/// `LF_ONEMETHOD`: a single method.
#[derive(Clone, Debug)]
#[allow(missing_docs)]
pub struct OneMethod<'a> {
    pub attr: u16,
    pub ty: TypeIndex,
    pub vbaseoff: u32,
    pub name: &'a BStr,
}

impl<'a> Parse<'a> for OneMethod<'a> {
    fn from_parser(p: &mut Parser<'a>) -> Result<Self, ParserError> {
        let attr = p.u16()?;
        let ty = p.type_index()?;
        let vbaseoff = if introduces_virtual(attr) {
            p.u32()?
        } else {
            0
        };
        let name = p.strz()?;
        Ok(OneMethod {
            attr,
            ty,
            vbaseoff,
            name,
        })
    }
}

/// `LF_NESTEDTYPE`: a nested type definition.
#[derive(Clone, Debug)]
#[allow(missing_docs)]
pub struct NestedType<'a> {
    pub nested_ty: TypeIndex,
    pub name: &'a BStr,
}

impl<'a> Parse<'a> for NestedType<'a> {
    fn from_parser(p: &mut Parser<'a>) -> Result<Self, ParserError> {
        p.skip(2)?; // padding
        Ok(Self {
            nested_ty: p.type_index()?,
            name: p.strz()?,
        })
    }
}

impl<'a> Iterator for IterFields<'a> {
    type Item = Field<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.bytes.is_empty() {
            return None;
        }
        let mut p = Parser::new(self.bytes);

        if skip_type_padding(&mut p).is_err() {
            // An invalid pad byte would jump past the end of the record.
            self.bytes = &[];
            return None;
        }

        if p.is_empty() {
            self.bytes = &[];
            return None;
        }

        match Field::parse_one(&mut p) {
            Ok(f) => {
                self.bytes = p.into_rest();
                Some(f)
            }
            Err(ParserError) => None,
        }
    }
}

impl<'a> Field<'a> {
    /// Parses one field within an `LF_FIELDLIST` type record.
    ///
    /// The sub-leaves of a field list have no length prefix; the kind of each field
    /// determines how many bytes it occupies, so decoding a field is what locates
    /// the next field.
    pub fn parse_one(p: &mut Parser<'a>) -> Result<Self, ParserError> {
        let item_kind = Leaf(p.u16()?);

        Ok(match item_kind {
            Leaf::LF_BCLASS => Self::BaseClass(p.parse()?),
            Leaf::LF_VBCLASS => Self::DirectVirtualBaseClass(p.parse()?),
            Leaf::LF_IVBCLASS => Self::IndirectVirtualBaseClass(p.parse()?),
            Leaf::LF_ENUMERATE => Self::Enumerate(p.parse()?),

            Leaf::LF_INDEX => {
                p.skip(2)?; // padding
                let ty = p.type_index()?;
                Self::Index(ty)
            }

            Leaf::LF_MEMBER => Self::Member(p.parse()?),
            Leaf::LF_STMEMBER => Self::StaticMember(p.parse()?),
            Leaf::LF_METHOD => Self::Method(p.parse()?),
            Leaf::LF_NESTEDTYPE => Self::NestedType(p.parse()?),

            Leaf::LF_VFUNCTAB => {
                p.skip(2)?; // padding
                let vtable_ty = p.type_index()?;
                Self::VFuncTable(vtable_ty)
            }

            Leaf::LF_ONEMETHOD => Self::OneMethod(p.parse()?),

            unknown_item_kind => {
                error!(?unknown_item_kind, "unrecognized item within LF_FIELDLIST");
                return Err(ParserError::new());
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// An enumerator with a tagged 32-bit value, padding, then a second enumerator.
    #[test]
    fn enumerate_with_wide_value() {
        let mut bytes: Vec<u8> = Vec::new();
        // LF_ENUMERATE, attr 0, LF_LONG 0xDEADBEEF, "X\0"
        bytes.extend_from_slice(&0x1502u16.to_le_bytes());
        bytes.extend_from_slice(&0u16.to_le_bytes());
        bytes.extend_from_slice(&[0x03, 0x80, 0xef, 0xbe, 0xad, 0xde]);
        bytes.extend_from_slice(b"X\0");
        // two pad bytes to realign, then a second enumerator with an immediate value
        bytes.extend_from_slice(&[0xf2, 0xf1]);
        bytes.extend_from_slice(&0x1502u16.to_le_bytes());
        bytes.extend_from_slice(&0u16.to_le_bytes());
        bytes.extend_from_slice(&7u16.to_le_bytes());
        bytes.extend_from_slice(b"Y\0");

        let fl = FieldList { bytes: &bytes };
        let fields: Vec<Field> = fl.iter().collect();
        assert_eq!(fields.len(), 2);

        let Field::Enumerate(e) = &fields[0] else {
            panic!("expected enumerator, got {:?}", fields[0]);
        };
        assert_eq!(e.name, "X");
        // The numeric field occupies exactly tag + dword.
        assert_eq!(e.value.as_bytes().len(), 6);
        assert_eq!(i64::try_from(e.value).unwrap() as u32, 0xdead_beef);

        let Field::Enumerate(e) = &fields[1] else {
            panic!("expected enumerator, got {:?}", fields[1]);
        };
        assert_eq!(e.name, "Y");
        assert_eq!(u32::try_from(e.value).unwrap(), 7);
    }

    /// A field list with members and a continuation index.
    #[test]
    fn member_and_index() {
        let mut bytes: Vec<u8> = Vec::new();
        // LF_MEMBER, attr 3, type 0x1003, offset 8, "field_a\0"
        bytes.extend_from_slice(&0x150du16.to_le_bytes());
        bytes.extend_from_slice(&3u16.to_le_bytes());
        bytes.extend_from_slice(&0x1003u32.to_le_bytes());
        bytes.extend_from_slice(&8u16.to_le_bytes());
        bytes.extend_from_slice(b"field_a\0");
        // LF_INDEX continuation: pad word, then the next LF_FIELDLIST
        bytes.extend_from_slice(&0x1404u16.to_le_bytes());
        bytes.extend_from_slice(&0u16.to_le_bytes());
        bytes.extend_from_slice(&0x1009u32.to_le_bytes());

        let fl = FieldList { bytes: &bytes };
        let fields: Vec<Field> = fl.iter().collect();
        assert_eq!(fields.len(), 2);

        let Field::Member(m) = &fields[0] else {
            panic!("expected member, got {:?}", fields[0]);
        };
        assert_eq!(m.attr, 3);
        assert_eq!(m.ty, TypeIndex(0x1003));
        assert_eq!(u32::try_from(m.offset).unwrap(), 8);
        assert_eq!(m.name, "field_a");

        assert!(matches!(fields[1], Field::Index(TypeIndex(0x1009))));
    }

    /// A name running into the end of the record is used as-is.
    #[test]
    fn unterminated_trailing_name() {
        let mut bytes: Vec<u8> = Vec::new();
        bytes.extend_from_slice(&0x1502u16.to_le_bytes());
        bytes.extend_from_slice(&0u16.to_le_bytes());
        bytes.extend_from_slice(&1u16.to_le_bytes());
        bytes.extend_from_slice(b"Last"); // no NUL

        let fl = FieldList { bytes: &bytes };
        let fields: Vec<Field> = fl.iter().collect();
        assert_eq!(fields.len(), 1);
        let Field::Enumerate(e) = &fields[0] else {
            panic!();
        };
        assert_eq!(e.name, "Last");
    }

    /// An invalid pad byte terminates iteration rather than spinning.
    #[test]
    fn pad_jump_past_end() {
        // 0xff announces 15 bytes of padding, but only one byte remains.
        let bytes = [0x02u8, 0x15, 0x00, 0x00, 0x01, 0x00, b'Z', 0x00, 0xff];
        let fl = FieldList { bytes: &bytes };
        let fields: Vec<Field> = fl.iter().collect();
        assert_eq!(fields.len(), 1);
    }
}
