use crate::entry::{Address, Entry, Quantity};
use proc_macro2::Ident;
use syn::{Data, DeriveInput, Fields};

#[derive(Debug, Clone)]
pub struct Mapping(pub Vec<Entry>);

impl Mapping {
    pub fn new(ast: &DeriveInput) -> Self {
        let data_struct = match ast.data.clone() {
            Data::Struct(data_struct) => data_struct,
            _ => panic!("Trait can be implemented only for a struct."),
        };

        let named_fields = match data_struct.fields {
            Fields::Named(fields_named) => fields_named.named,
            _ => panic!("Trait can be implemented only for a struct with named fields."),
        };
        let map: Vec<Entry> = named_fields
            .into_iter()
            .filter(|field| {
                field
                    .attrs
                    .iter()
                    .any(|attr| attr.path().is_ident("modbus"))
            })
            .map(From::from)
            .collect::<Vec<_>>();

        let mapping = Self::sorted(map);
        if let Some((a, b)) = mapping.first_overlap() {
            panic!(
                "In `{}`, register ranges of `{}` and `{}` overlap.",
                ast.ident, a.field_name, b.field_name
            );
        }
        if let Some(entry) = mapping.0.iter().find(|entry| entry.end() > 0xFFFF) {
            panic!(
                "In `{}`, `{}` does not fit below register address 65535.",
                ast.ident, entry.field_name
            );
        }

        mapping
    }

    fn sorted(mut map: Vec<Entry>) -> Self {
        map.sort_by_key(|x| x.addr);
        Self(map)
    }

    /// First pair of neighbouring entries whose register ranges intersect.
    pub fn first_overlap(&self) -> Option<(&Entry, &Entry)> {
        self.0
            .windows(2)
            .find(|pair| pair[0].end() > u32::from(pair[1].addr))
            .map(|pair| (&pair[0], &pair[1]))
    }

    pub fn field_name_vec(&self) -> Vec<Ident> {
        self.0
            .iter()
            .map(|x| x.field_name_ident())
            .collect::<Vec<_>>()
    }

    pub fn field_name_str_vec(&self) -> Vec<String> {
        self.0.iter().map(|x| x.field_name.clone()).collect()
    }

    pub fn addr_vec(&self) -> Vec<Address> {
        self.0.iter().map(|x| x.addr).collect::<Vec<_>>()
    }

    pub fn ty_vec(&self) -> Vec<Ident> {
        self.0
            .iter()
            .map(|entry| entry.ty_ident())
            .collect::<Vec<_>>()
    }

    pub fn cnt_vec(&self) -> Vec<Quantity> {
        self.0.iter().map(|x| x.ty.word_size()).collect::<Vec<_>>()
    }

    pub fn unit_vec(&self) -> Vec<String> {
        self.0.iter().map(|x| x.unit.clone()).collect()
    }

    pub fn fn_to_words_vec(&self) -> Vec<Ident> {
        self.0
            .iter()
            .map(|entry| entry.fn_to_words())
            .collect::<Vec<_>>()
    }
}
