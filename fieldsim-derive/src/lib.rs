//! Macros to `derive` the `fieldsim` register model traits

use proc_macro::TokenStream;
use quote::quote;

mod entry;
mod mapping;
mod utils;

/// Derive macro to implement `fieldsim::codec::InputRegisterModel`.
///
/// Every field carrying a `modbus` attribute is exposed as a read-only block of
/// input registers starting at `addr`. The value is cast to `ty` and encoded in
/// `ord` word order (`"be"` by default). Fields without the attribute are ignored.
#[proc_macro_derive(InputRegisterModel, attributes(modbus))]
pub fn derive_input_register_model(input: TokenStream) -> TokenStream {
    let ast = syn::parse_macro_input!(input as syn::DeriveInput);

    let name = &ast.ident;
    let (impl_generics, ty_generics, where_clause) = ast.generics.split_for_impl();

    let mapping = mapping::Mapping::new(&ast);

    let field_name = mapping.field_name_vec();
    let field_name_str = mapping.field_name_str_vec();
    let addr = mapping.addr_vec();
    let cnt = mapping.cnt_vec();
    let ty = mapping.ty_vec();
    let unit = mapping.unit_vec();
    let to_words = mapping.fn_to_words_vec();

    let tokens = quote! {
        impl #impl_generics fieldsim::codec::InputRegisterModel for #name #ty_generics #where_clause {
            const INPUT_REGISTERS: &'static [fieldsim::codec::RegisterEntry] = &[
                #(
                    fieldsim::codec::RegisterEntry {
                        name: #field_name_str,
                        addr: #addr,
                        cnt: #cnt,
                        unit: #unit,
                    },
                )*
            ];

            fn input_register(&self, addr: fieldsim::codec::Address) -> Option<fieldsim::codec::Word> {
                #(
                    if (#addr..#addr + #cnt).contains(&addr) {
                        #[allow(clippy::unnecessary_cast)]
                        let value = self.#field_name as #ty;
                        let words: Vec<fieldsim::codec::Word> = fieldsim::codec::Encode::#to_words(value);
                        return words.get((addr - #addr) as usize).copied();
                    }
                )*
                None
            }
        }
    };

    tokens.into()
}

/// Attribute macro adding a doc line to every field with a `modbus` attribute,
/// describing its register address, data type and unit.
#[proc_macro_attribute]
pub fn modbus_doc(_attr: TokenStream, item: TokenStream) -> TokenStream {
    let mut ast = syn::parse_macro_input!(item as syn::DeriveInput);
    match &mut ast.data {
        syn::Data::Struct(ref mut struct_data) => {
            match &mut struct_data.fields {
                syn::Fields::Named(fields_named) => {
                    for field in &mut fields_named.named {
                        if field
                            .attrs
                            .iter()
                            .any(|attr| attr.path().is_ident("modbus"))
                        {
                            let entry: entry::Entry = field.clone().into();
                            let last = entry.addr as u32 + entry.ty.word_size() as u32 - 1;
                            let mut doc = format!(
                                "Input registers `{}..={}`, data type `{:?}`, word order `{:?}`",
                                entry.addr, last, entry.ty, entry.ord
                            );
                            if !entry.unit.is_empty() {
                                doc.push_str(&format!(", unit `{}`", entry.unit));
                            }
                            doc.push('.');
                            let doc: syn::Attribute = syn::parse_quote!(#[doc = #doc]);
                            field.attrs.push(doc);
                        }
                    }
                }
                _ => panic!("`modbus_doc` has to be applied to structs with named fields"),
            }

            quote! {
                #ast
            }
            .into()
        }
        _ => panic!("`modbus_doc` has to be applied with structs"),
    }
}
