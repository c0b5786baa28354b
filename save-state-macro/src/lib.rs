use proc_macro::TokenStream;

/// Fields marked `#[transient]` are neither written nor read; they keep
/// whatever value the target already holds.
fn is_transient(field: &syn::Field) -> bool {
    field.attrs.iter().any(|attr| {
        attr.path
            .segments
            .last()
            .filter(|i| i.ident == "transient")
            .is_some()
    })
}

fn get_struct_fields(
    struct_fields: &syn::Fields,
) -> (Vec<impl quote::ToTokens>, Vec<impl quote::ToTokens>) {
    let accessors: Vec<_> = struct_fields
        .iter()
        .enumerate()
        .filter(|(_, field)| !is_transient(field))
        .map(|(i, field)| match &field.ident {
            Some(name) => quote::quote!(#name),
            None => {
                let i = syn::Index::from(i);
                quote::quote!(#i)
            }
        })
        .collect::<Vec<_>>();
    let ser_expr = accessors
        .iter()
        .map(|field| {
            quote::quote! {
                save_state::InSaveState::serialize(&self.#field, state)
            }
        })
        .collect::<Vec<_>>();
    let deser_expr = accessors
        .iter()
        .map(|field| {
            quote::quote! {
                save_state::InSaveState::deserialize(&mut self.#field, state)?
            }
        })
        .collect::<Vec<_>>();
    (ser_expr, deser_expr)
}

#[proc_macro_derive(InSaveState, attributes(transient))]
pub fn derive_in_save_state(input_struct: TokenStream) -> TokenStream {
    match syn::parse::<syn::DeriveInput>(input_struct) {
        Ok(derive_input) => {
            let (impl_generics, ty_generics, where_clause) = derive_input.generics.split_for_impl();
            let ty_name = &derive_input.ident;
            let (ser_expr, deser_expr) = match &derive_input.data {
                syn::Data::Struct(field_struct) => get_struct_fields(&field_struct.fields),
                _ => {
                    return {
                        let text = format!("expected struct, got `{}`", derive_input.ident);
                        syn::parse::Error::new_spanned(&derive_input, text)
                    }
                    .into_compile_error()
                    .into()
                }
            };
            quote::quote!(
                impl #impl_generics save_state::InSaveState
                        for #ty_name #ty_generics #where_clause {
                    fn serialize(&self, state: &mut save_state::SaveStateSerializer) {
                        #(#ser_expr;)*
                    }

                    fn deserialize(
                        &mut self,
                        state: &mut save_state::SaveStateDeserializer,
                    ) -> ::core::result::Result<(), save_state::OutOfData> {
                        #(#deser_expr;)*
                        Ok(())
                    }
                }
            )
            .into()
        }
        Err(err) => err.to_compile_error().into(),
    }
}

#[proc_macro_derive(DefaultByNew)]
pub fn derive_default_by_new(input_struct: TokenStream) -> TokenStream {
    let derive_input = match syn::parse::<syn::DeriveInput>(input_struct) {
        Ok(derive_input) => derive_input,
        Err(err) => return err.to_compile_error().into(),
    };
    let (impl_generics, ty_generics, where_clause) = derive_input.generics.split_for_impl();
    let ty_name = &derive_input.ident;
    quote::quote! {
        impl #impl_generics Default for #ty_name #ty_generics #where_clause {
            fn default() -> Self {
                Self::new()
            }
        }
    }
    .into()
}
