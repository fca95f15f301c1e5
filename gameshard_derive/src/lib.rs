use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::{Data, DeriveInput, Fields, Ident, LitStr, Type, parse_macro_input, spanned::Spanned};

/// Derives `gameshard::Record` for a struct with named fields.
///
/// ```ignore
/// #[derive(Record)]
/// #[record(table = "user")]
/// struct User {
///     #[sql(pk, shard_key)]
///     id: u64,
///     name: String,
///     #[sql(name = "created_at")]
///     created: chrono::NaiveDateTime,
/// }
/// ```
#[proc_macro_derive(Record, attributes(record, sql))]
pub fn derive_record(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    match expand_record(input) {
        Ok(tokens) => tokens.into(),
        Err(err) => err.to_compile_error().into(),
    }
}

fn expand_record(input: DeriveInput) -> syn::Result<TokenStream2> {
    let struct_name = input.ident;

    if !input.generics.params.is_empty() {
        return Err(syn::Error::new_spanned(
            input.generics,
            "Record does not support generic structs",
        ));
    }

    let record_options = parse_record_options(&input.attrs)?;

    let data_struct = match input.data {
        Data::Struct(data) => data,
        _ => {
            return Err(syn::Error::new(
                struct_name.span(),
                "Record can only be derived for structs",
            ));
        }
    };

    let named_fields = match data_struct.fields {
        Fields::Named(fields) => fields,
        _ => {
            return Err(syn::Error::new(
                struct_name.span(),
                "Record requires named fields",
            ));
        }
    };

    let mut columns = Vec::<MappedField>::new();
    let mut skipped = Vec::<Ident>::new();

    for field in named_fields.named {
        let ident = field
            .ident
            .clone()
            .ok_or_else(|| syn::Error::new(field.span(), "Record requires named fields"))?;
        let options = parse_sql_field_options(&field.attrs)?;
        if options.skip {
            skipped.push(ident);
            continue;
        }
        let column_name = options
            .column_name
            .clone()
            .unwrap_or_else(|| ident.to_string().trim_start_matches("r#").to_string());
        columns.push(MappedField {
            ident,
            ty: field.ty,
            column_name,
            options,
        });
    }

    if columns.is_empty() {
        return Err(syn::Error::new(
            struct_name.span(),
            "Record requires at least one mapped column",
        ));
    }

    if !columns.iter().any(|field| field.options.primary_key) {
        return Err(syn::Error::new(
            struct_name.span(),
            "Record requires at least one #[sql(pk)] column",
        ));
    }

    let shard_keys = columns
        .iter()
        .filter(|field| field.options.shard_key)
        .collect::<Vec<_>>();
    if shard_keys.len() > 1 {
        return Err(syn::Error::new(
            shard_keys[1].ident.span(),
            "multiple #[sql(shard_key)] columns are not allowed",
        ));
    }

    let sequences = columns
        .iter()
        .filter(|field| field.options.sequence)
        .collect::<Vec<_>>();
    if sequences.len() > 1 {
        return Err(syn::Error::new(
            sequences[1].ident.span(),
            "multiple #[sql(seq)] columns are not allowed",
        ));
    }

    let table_name = record_options
        .table_name
        .unwrap_or_else(|| to_snake_case(&struct_name.to_string()));

    let column_defs = columns.iter().map(|field| {
        let name = field.column_name.as_str();
        let mut def = quote!(::gameshard::ColumnDef::new(#name));
        if field.options.primary_key {
            def = quote!(#def.primary_key());
        }
        if field.options.shard_key {
            def = quote!(#def.shard_key());
        }
        if field.options.sequence {
            def = quote!(#def.sequence());
        }
        def
    });

    let value_exprs = columns.iter().map(|field| {
        let ident = &field.ident;
        quote!(::gameshard::Value::from(::std::clone::Clone::clone(&self.#ident)))
    });

    let row_fields = columns.iter().map(|field| {
        let ident = &field.ident;
        let ty = &field.ty;
        let name = field.column_name.as_str();
        quote!(#ident: row.get_as::<#ty>(#name)?)
    });

    let sequence_methods = match sequences.first() {
        Some(field) => {
            let ident = &field.ident;
            quote! {
                fn sequence(&self) -> ::std::option::Option<u64> {
                    ::std::option::Option::Some(self.#ident)
                }

                fn set_sequence(&mut self, value: u64) {
                    self.#ident = value;
                }
            }
        }
        None => quote!(),
    };

    Ok(quote! {
        impl ::gameshard::Record for #struct_name {
            fn schema() -> &'static ::gameshard::RecordSchema {
                static SCHEMA: ::std::sync::OnceLock<::gameshard::RecordSchema> =
                    ::std::sync::OnceLock::new();
                SCHEMA.get_or_init(|| {
                    ::gameshard::RecordSchema::new(#table_name, vec![#(#column_defs),*])
                })
            }

            fn values(&self) -> ::std::vec::Vec<::gameshard::Value> {
                vec![#(#value_exprs),*]
            }

            fn from_row(row: &::gameshard::Row) -> ::gameshard::Result<Self> {
                ::std::result::Result::Ok(Self {
                    #(#row_fields,)*
                    #(#skipped: ::std::default::Default::default(),)*
                })
            }

            #sequence_methods
        }
    })
}

struct MappedField {
    ident: Ident,
    ty: Type,
    column_name: String,
    options: SqlFieldOptions,
}

struct RecordOptions {
    table_name: Option<String>,
}

#[derive(Clone, Default)]
struct SqlFieldOptions {
    primary_key: bool,
    shard_key: bool,
    sequence: bool,
    skip: bool,
    column_name: Option<String>,
}

fn to_snake_case(value: &str) -> String {
    let mut out = String::new();
    for (index, ch) in value.chars().enumerate() {
        if ch.is_uppercase() {
            if index > 0 {
                out.push('_');
            }
            out.extend(ch.to_lowercase());
        } else {
            out.push(ch);
        }
    }
    out
}

fn path_ends_with_ident(path: &syn::Path, ident: &str) -> bool {
    path.segments
        .last()
        .map(|segment| segment.ident == ident)
        .unwrap_or(false)
}

fn parse_sql_field_options(attrs: &[syn::Attribute]) -> syn::Result<SqlFieldOptions> {
    let mut options: Option<SqlFieldOptions> = None;

    for attr in attrs {
        if !path_ends_with_ident(attr.path(), "sql") {
            continue;
        }

        if options.is_some() {
            return Err(syn::Error::new(
                attr.span(),
                "Duplicate #[sql(...)] attribute on field",
            ));
        }

        let mut parsed = SqlFieldOptions::default();
        match &attr.meta {
            syn::Meta::List(list) => {
                list.parse_nested_meta(|meta| {
                    if meta.path.is_ident("pk") {
                        parsed.primary_key = true;
                        return Ok(());
                    }

                    if meta.path.is_ident("shard_key") || meta.path.is_ident("shard") {
                        parsed.shard_key = true;
                        return Ok(());
                    }

                    if meta.path.is_ident("seq") {
                        parsed.sequence = true;
                        return Ok(());
                    }

                    if meta.path.is_ident("skip") {
                        parsed.skip = true;
                        return Ok(());
                    }

                    if meta.path.is_ident("name") || meta.path.is_ident("column") {
                        let value = meta.value()?;
                        let lit: LitStr = value.parse()?;
                        parsed.column_name = Some(lit.value());
                        return Ok(());
                    }

                    Err(meta.error(
                        "Unsupported #[sql(...)] option. Supported: pk, shard_key, seq, skip, name = \"...\"",
                    ))
                })?;
            }
            _ => {
                return Err(syn::Error::new(
                    attr.span(),
                    "Unsupported #[sql] syntax. Use #[sql(pk)], #[sql(shard_key)], #[sql(seq)], #[sql(skip)], #[sql(name = \"...\")]",
                ));
            }
        }

        if parsed.skip
            && (parsed.primary_key
                || parsed.shard_key
                || parsed.sequence
                || parsed.column_name.is_some())
        {
            return Err(syn::Error::new(
                attr.span(),
                "#[sql(skip)] cannot be combined with other column options",
            ));
        }

        options = Some(parsed);
    }

    Ok(options.unwrap_or_default())
}

fn parse_record_options(attrs: &[syn::Attribute]) -> syn::Result<RecordOptions> {
    let mut options = RecordOptions { table_name: None };

    for attr in attrs {
        if !attr.path().is_ident("record") {
            continue;
        }

        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("table") {
                let value = meta.value()?;
                let lit: LitStr = value.parse()?;
                options.table_name = Some(lit.value());
                return Ok(());
            }

            Err(meta.error("Unsupported record attribute. Supported: table = \"...\""))
        })?;
    }

    Ok(options)
}
