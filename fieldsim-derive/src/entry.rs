use crate::utils::{expr_assign_predicate, get_punctuated, panic_no_key, panic_not_literal};
use proc_macro2::{Ident, Span};
use syn::{punctuated::Punctuated, token::Comma, Expr, ExprAssign, Field, Lit};

#[derive(Debug, Clone)]
/// Single input register entry. Parsed from field attributes and to be used in proc macros
pub struct Entry {
    pub field_name: String,
    pub addr: Address,
    pub ty: DataType,
    pub ord: WordOrder,
    pub unit: String,
}

pub type Address = u16;
pub type Quantity = u16;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DataType {
    U16,
    U32,
    U64,
    I16,
    I32,
    I64,
    F32,
    F64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum WordOrder {
    BigEndian,
    LittleEndian,
}

impl From<String> for DataType {
    fn from(value: String) -> Self {
        match value.as_str() {
            "u16" => DataType::U16,
            "u32" => DataType::U32,
            "u64" => DataType::U64,
            "i16" => DataType::I16,
            "i32" => DataType::I32,
            "i64" => DataType::I64,
            "f32" => DataType::F32,
            "f64" => DataType::F64,
            s => panic!("Invalid `ty` variant \"{s}\". Use one of \"u16\", \"u32\", \"u64\", \"i16\", \"i32\", \"i64\", \"f32\" or \"f64\"."),
        }
    }
}

impl DataType {
    pub fn word_size(&self) -> Quantity {
        match self {
            DataType::U16 | DataType::I16 => 1,
            DataType::U32 | DataType::I32 | DataType::F32 => 2,
            DataType::U64 | DataType::I64 | DataType::F64 => 4,
        }
    }
}

impl From<String> for WordOrder {
    fn from(value: String) -> Self {
        match value.as_str() {
            "be" => WordOrder::BigEndian,
            "le" => WordOrder::LittleEndian,
            s => panic!(
                "Invalid `WordOrder` variant \"{s}\". Use \"be\" for BigEndian or \"le\" for LittleEndian."
            ),
        }
    }
}

impl From<Field> for Entry {
    fn from(value: Field) -> Self {
        let field_name = value
            .ident
            .unwrap_or_else(|| panic!("Unexpected unnamed struct field."))
            .to_string();

        let attr = value
            .attrs
            .iter()
            .find(|attr| attr.path().is_ident("modbus"))
            .unwrap_or_else(|| {
                panic!("Unexpected missing attribute `modbus` for `{field_name}` field.")
            })
            .clone();
        let punctuated = get_punctuated(&attr, &field_name);

        let addr = Self::get_addr(&punctuated, &field_name);
        let ty = Self::get_ty(&punctuated, &field_name);
        // Registers are high word first unless stated otherwise.
        let ord = Self::get_str(&punctuated, "ord", &field_name)
            .map(WordOrder::from)
            .unwrap_or(WordOrder::BigEndian);
        let unit = Self::get_str(&punctuated, "unit", &field_name).unwrap_or_default();

        Self {
            field_name,
            addr,
            ty,
            ord,
            unit,
        }
    }
}

impl Entry {
    // Macro helpers

    pub fn fn_to_words(&self) -> Ident {
        match &self.ord {
            WordOrder::BigEndian => Ident::new("to_be_words", Span::call_site()),
            WordOrder::LittleEndian => Ident::new("to_le_words", Span::call_site()),
        }
    }

    pub fn ty_ident(&self) -> Ident {
        let ty = match &self.ty {
            DataType::U16 => "u16",
            DataType::U32 => "u32",
            DataType::U64 => "u64",
            DataType::I16 => "i16",
            DataType::I32 => "i32",
            DataType::I64 => "i64",
            DataType::F32 => "f32",
            DataType::F64 => "f64",
        };
        Ident::new(ty, Span::call_site())
    }

    pub fn field_name_ident(&self) -> Ident {
        Ident::new(&self.field_name, Span::call_site())
    }

    /// One past the last register occupied by the entry.
    pub fn end(&self) -> u32 {
        u32::from(self.addr) + u32::from(self.ty.word_size())
    }

    // Parsing helpers

    fn get_addr(punctuated: &Punctuated<ExprAssign, Comma>, field_name: &str) -> Address {
        punctuated
            .iter()
            .filter(expr_assign_predicate("addr", field_name))
            .map(|expr_assign| match *expr_assign.right.clone() {
                Expr::Lit(right) => match right.lit {
                    Lit::Int(lit_int) => lit_int,
                    _ => panic_not_literal("addr", "integer", field_name),
                },
                _ => panic_not_literal("addr", "integer", field_name),
            })
            .next()
            .unwrap_or_else(|| panic_no_key("addr", field_name))
            .base10_parse::<Address>()
            .unwrap_or_else(|_| panic!("In `modbus` attribute for `{field_name}`, the key `addr` could not be parsed to u16."))
    }

    fn get_ty(punctuated: &Punctuated<ExprAssign, Comma>, field_name: &str) -> DataType {
        Self::get_str(punctuated, "ty", field_name)
            .unwrap_or_else(|| panic_no_key("ty", field_name))
            .into()
    }

    fn get_str(
        punctuated: &Punctuated<ExprAssign, Comma>,
        key: &str,
        field_name: &str,
    ) -> Option<String> {
        punctuated
            .iter()
            .filter(expr_assign_predicate(key, field_name))
            .map(|expr_assign| match *expr_assign.right.clone() {
                Expr::Lit(right) => match right.lit {
                    Lit::Str(lit_str) => lit_str.value(),
                    _ => panic_not_literal(key, "string", field_name),
                },
                _ => panic_not_literal(key, "string", field_name),
            })
            .next()
    }
}
