use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::{
    Data, DeriveInput, Expr, Fields, Ident, Lit, LitStr, Type, parse_macro_input,
    spanned::Spanned,
};

#[proc_macro_derive(Record, attributes(record, column))]
pub fn derive_record(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    match expand_record(input) {
        Ok(tokens) => tokens.into(),
        Err(err) => err.to_compile_error().into(),
    }
}

#[proc_macro_derive(SqlEnum)]
pub fn derive_sql_enum(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    match expand_sql_enum(input) {
        Ok(tokens) => tokens.into(),
        Err(err) => err.to_compile_error().into(),
    }
}

// ============================================================================
// #[derive(Record)]
// ============================================================================

fn expand_record(input: DeriveInput) -> syn::Result<TokenStream2> {
    let struct_name = input.ident;

    if !input.generics.params.is_empty() {
        return Err(syn::Error::new_spanned(
            input.generics,
            "Record does not support generic structs",
        ));
    }

    let options = parse_record_options(&input.attrs)?;

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

    let mut fields = Vec::<MappedField>::new();
    for field in named_fields.named {
        let ident = field
            .ident
            .clone()
            .ok_or_else(|| syn::Error::new(field.span(), "Record requires named fields"))?;
        let column_options = parse_column_options(&field.attrs)?;
        fields.push(MappedField {
            ident,
            ty: field.ty,
            options: column_options,
        });
    }

    let identity_index = find_identity_field(&struct_name, &fields)?;

    let mut column_descriptors = Vec::<TokenStream2>::new();
    let mut value_arms = Vec::<TokenStream2>::new();
    let mut row_reads = Vec::<TokenStream2>::new();

    for (index, field) in fields.iter().enumerate() {
        let ident = &field.ident;
        let ty = &field.ty;

        if field.options.skip {
            row_reads.push(quote! { #ident: ::core::default::Default::default() });
            continue;
        }

        let field_name = field.field_name();
        let column_name = field.column_name();

        let mut descriptor = quote! {
            ::rowkeeper::ColumnDescriptor::new(
                #field_name,
                <#ty as ::rowkeeper::SqlValue>::data_type(),
            )
            .column_name(#column_name)
        };
        if identity_index == Some(index) {
            descriptor = quote! { #descriptor.identity() };
        }
        if field.options.read_only {
            descriptor = quote! { #descriptor.read_only() };
        }
        if field.options.insert_only {
            descriptor = quote! { #descriptor.save_action(::rowkeeper::SaveAction::InsertOnly) };
        }
        if field.options.update_only {
            descriptor = quote! { #descriptor.save_action(::rowkeeper::SaveAction::UpdateOnly) };
        }
        if field.options.key {
            descriptor = quote! { #descriptor.key() };
        }
        if field.options.symbolic {
            descriptor = quote! {
                #descriptor.symbolic(<#ty as ::rowkeeper::Symbolic>::symbol_of)
            };
        }
        if let Some(lookup) = &field.options.lookup {
            let table = &lookup.table;
            let mut lookup_ref = quote! { ::rowkeeper::LookupRef::new(#table) };
            if let Some(key_column) = &lookup.key_column {
                lookup_ref = quote! { #lookup_ref.key_column(#key_column) };
            }
            if let Some(text_column) = &lookup.text_column {
                lookup_ref = quote! { #lookup_ref.text_column(#text_column) };
            }
            descriptor = quote! { #descriptor.lookup(#lookup_ref) };
        }
        column_descriptors.push(quote! { .column(#descriptor) });

        value_arms.push(quote! {
            #column_name => ::core::option::Option::Some(
                <#ty as ::rowkeeper::SqlValue>::to_value(&self.#ident)
            )
        });
        row_reads.push(quote! { #ident: row.get_as::<#ty>(#column_name)? });
    }

    let table = options
        .table_name
        .as_ref()
        .map(|table| quote! { .table(#table) });

    let select_override = match (&options.select_from, &options.select_where) {
        (Some(from), Some(where_by_id)) => Some(quote! {
            .select_override(::rowkeeper::SelectOverride::new(#from, #where_by_id))
        }),
        (None, None) => None,
        _ => {
            return Err(syn::Error::new(
                struct_name.span(),
                "#[record(select_from = ...)] and #[record(select_where = ...)] must be used together",
            ));
        }
    };

    // Records without an identity keep an `i64` that always reads as unset.
    let identity_impl = match identity_index {
        Some(index) => {
            let ident = &fields[index].ident;
            let ty = &fields[index].ty;
            quote! {
                type Id = #ty;

                fn id(&self) -> Self::Id {
                    ::core::clone::Clone::clone(&self.#ident)
                }

                fn set_id(&mut self, id: Self::Id) {
                    self.#ident = id;
                }
            }
        }
        None => quote! {
            type Id = i64;

            fn id(&self) -> Self::Id {
                0
            }

            fn set_id(&mut self, _id: Self::Id) {}
        },
    };

    let as_validate = options.validate.then(|| {
        quote! {
            fn as_validate(&self) -> ::core::option::Option<&dyn ::rowkeeper::Validate> {
                ::core::option::Option::Some(self)
            }
        }
    });
    let as_post_load = options.post_load.then(|| {
        quote! {
            fn as_post_load(&mut self) -> ::core::option::Option<&mut dyn ::rowkeeper::PostLoad> {
                ::core::option::Option::Some(self)
            }
        }
    });
    let as_text_lookup = options.text_lookup.then(|| {
        quote! {
            fn as_text_lookup(&self) -> ::core::option::Option<&dyn ::rowkeeper::TextLookup> {
                ::core::option::Option::Some(self)
            }
        }
    });

    Ok(quote! {
        impl ::rowkeeper::Record for #struct_name {
            #identity_impl

            fn descriptor() -> ::rowkeeper::RecordDescriptor {
                ::rowkeeper::RecordDescriptor::new(stringify!(#struct_name))
                    #table
                    #(#column_descriptors)*
                    #select_override
            }

            fn value(&self, column: &str) -> ::core::option::Option<::rowkeeper::Value> {
                match column {
                    #(#value_arms,)*
                    _ => ::core::option::Option::None,
                }
            }

            fn from_row(row: &::rowkeeper::Row) -> ::rowkeeper::Result<Self> {
                ::core::result::Result::Ok(Self {
                    #(#row_reads,)*
                })
            }

            #as_validate
            #as_post_load
            #as_text_lookup
        }
    })
}

struct MappedField {
    ident: Ident,
    ty: Type,
    options: ColumnOptions,
}

impl MappedField {
    fn field_name(&self) -> String {
        self.ident.to_string().trim_start_matches("r#").to_string()
    }

    fn column_name(&self) -> String {
        self.options
            .column_name
            .clone()
            .unwrap_or_else(|| to_pascal_case(&self.field_name()))
    }
}

#[derive(Default)]
struct RecordOptions {
    table_name: Option<String>,
    select_from: Option<String>,
    select_where: Option<String>,
    validate: bool,
    post_load: bool,
    text_lookup: bool,
}

struct LookupOptions {
    table: String,
    key_column: Option<String>,
    text_column: Option<String>,
}

#[derive(Default)]
struct ColumnOptions {
    identity: bool,
    skip: bool,
    read_only: bool,
    insert_only: bool,
    update_only: bool,
    key: bool,
    symbolic: bool,
    column_name: Option<String>,
    lookup: Option<LookupOptions>,
}

/// Flagged field, else a field or column named `Id`, else one named
/// `<Struct>Id` or `<struct>_id` (case-insensitive). `None` when nothing matches.
fn find_identity_field(struct_name: &Ident, fields: &[MappedField]) -> syn::Result<Option<usize>> {
    let flagged: Vec<usize> = fields
        .iter()
        .enumerate()
        .filter(|(_, field)| field.options.identity)
        .map(|(index, _)| index)
        .collect();

    match flagged.as_slice() {
        [single] => return Ok(Some(*single)),
        [] => {}
        [_, second, ..] => {
            return Err(syn::Error::new(
                fields[*second].ident.span(),
                "Record allows only one #[column(identity)] field",
            ));
        }
    }

    let shape = struct_name.to_string().to_ascii_lowercase();
    let shape_id = format!("{}id", shape);
    let shape_snake_id = format!("{}_id", shape);
    let names = |field: &MappedField| {
        [field.field_name().to_ascii_lowercase(), field.column_name().to_ascii_lowercase()]
    };
    let candidates = || fields.iter().enumerate().filter(|(_, field)| !field.options.skip);

    let plain_id = candidates()
        .find(|(_, field)| names(field).iter().any(|name| name == "id"))
        .map(|(index, _)| index);
    Ok(plain_id.or_else(|| {
        candidates()
            .find(|(_, field)| {
                names(field)
                    .iter()
                    .any(|name| *name == shape_id || *name == shape_snake_id)
            })
            .map(|(index, _)| index)
    }))
}

fn parse_record_options(attrs: &[syn::Attribute]) -> syn::Result<RecordOptions> {
    let mut options = RecordOptions::default();

    for attr in attrs {
        if !attr.path().is_ident("record") {
            continue;
        }

        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("table") {
                let lit: LitStr = meta.value()?.parse()?;
                options.table_name = Some(lit.value());
                return Ok(());
            }

            if meta.path.is_ident("select_from") {
                let lit: LitStr = meta.value()?.parse()?;
                options.select_from = Some(lit.value());
                return Ok(());
            }

            if meta.path.is_ident("select_where") {
                let lit: LitStr = meta.value()?.parse()?;
                options.select_where = Some(lit.value());
                return Ok(());
            }

            if meta.path.is_ident("validate") {
                options.validate = true;
                return Ok(());
            }

            if meta.path.is_ident("post_load") {
                options.post_load = true;
                return Ok(());
            }

            if meta.path.is_ident("text_lookup") {
                options.text_lookup = true;
                return Ok(());
            }

            Err(meta.error(
                "Unsupported record attribute. Supported: table = \"...\", select_from = \"...\", select_where = \"...\", validate, post_load, text_lookup",
            ))
        })?;
    }

    Ok(options)
}

fn parse_column_options(attrs: &[syn::Attribute]) -> syn::Result<ColumnOptions> {
    let mut options = ColumnOptions::default();
    let mut lookup_table: Option<String> = None;
    let mut lookup_key: Option<String> = None;
    let mut lookup_text: Option<String> = None;

    for attr in attrs {
        if !attr.path().is_ident("column") {
            continue;
        }

        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("identity") {
                options.identity = true;
                return Ok(());
            }

            if meta.path.is_ident("skip") {
                options.skip = true;
                return Ok(());
            }

            if meta.path.is_ident("read_only") {
                options.read_only = true;
                return Ok(());
            }

            if meta.path.is_ident("insert_only") {
                options.insert_only = true;
                return Ok(());
            }

            if meta.path.is_ident("update_only") {
                options.update_only = true;
                return Ok(());
            }

            if meta.path.is_ident("key") {
                options.key = true;
                return Ok(());
            }

            if meta.path.is_ident("symbolic") {
                options.symbolic = true;
                return Ok(());
            }

            if meta.path.is_ident("name") {
                let lit: LitStr = meta.value()?.parse()?;
                options.column_name = Some(lit.value());
                return Ok(());
            }

            if meta.path.is_ident("lookup") {
                let lit: LitStr = meta.value()?.parse()?;
                lookup_table = Some(lit.value());
                return Ok(());
            }

            if meta.path.is_ident("lookup_key") {
                let lit: LitStr = meta.value()?.parse()?;
                lookup_key = Some(lit.value());
                return Ok(());
            }

            if meta.path.is_ident("lookup_text") {
                let lit: LitStr = meta.value()?.parse()?;
                lookup_text = Some(lit.value());
                return Ok(());
            }

            Err(meta.error(
                "Unsupported #[column(...)] option. Supported: identity, skip, read_only, insert_only, update_only, key, symbolic, name = \"...\", lookup = \"...\", lookup_key = \"...\", lookup_text = \"...\"",
            ))
        })?;

        if options.skip && (options.identity || options.column_name.is_some() || options.key) {
            return Err(syn::Error::new(
                attr.span(),
                "#[column(skip)] cannot be combined with other column options",
            ));
        }

        if options.insert_only && options.update_only {
            return Err(syn::Error::new(
                attr.span(),
                "#[column(insert_only)] and #[column(update_only)] are mutually exclusive",
            ));
        }

        if options.symbolic && lookup_table.is_some() {
            return Err(syn::Error::new(
                attr.span(),
                "#[column(symbolic)] cannot be combined with #[column(lookup = ...)]",
            ));
        }

        if lookup_table.is_none() && (lookup_key.is_some() || lookup_text.is_some()) {
            return Err(syn::Error::new(
                attr.span(),
                "lookup_key and lookup_text require lookup = \"...\"",
            ));
        }
    }

    options.lookup = lookup_table.map(|table| LookupOptions {
        table,
        key_column: lookup_key,
        text_column: lookup_text,
    });

    Ok(options)
}

// ============================================================================
// #[derive(SqlEnum)]
// ============================================================================

fn expand_sql_enum(input: DeriveInput) -> syn::Result<TokenStream2> {
    let enum_name = input.ident;

    let data_enum = match input.data {
        Data::Enum(data) => data,
        _ => {
            return Err(syn::Error::new(
                enum_name.span(),
                "SqlEnum can only be derived for enums",
            ));
        }
    };

    let mut to_arms = Vec::<TokenStream2>::new();
    let mut from_arms = Vec::<TokenStream2>::new();
    let mut symbol_arms = Vec::<TokenStream2>::new();
    let mut next_ordinal: i64 = 0;

    for variant in data_enum.variants {
        if !matches!(variant.fields, Fields::Unit) {
            return Err(syn::Error::new(
                variant.span(),
                "SqlEnum requires fieldless variants",
            ));
        }

        let ordinal = match &variant.discriminant {
            Some((_, expr)) => parse_discriminant(expr)?,
            None => next_ordinal,
        };
        next_ordinal = ordinal + 1;

        let ident = &variant.ident;
        let symbol = ident.to_string();
        to_arms.push(quote! { Self::#ident => #ordinal });
        from_arms.push(quote! { ::core::option::Option::Some(#ordinal) => ::core::result::Result::Ok(Self::#ident) });
        symbol_arms.push(quote! { ::core::option::Option::Some(#ordinal) => ::core::option::Option::Some(#symbol) });
    }

    Ok(quote! {
        impl ::rowkeeper::SqlValue for #enum_name {
            fn data_type() -> ::rowkeeper::DataType {
                ::rowkeeper::DataType::Integer
            }

            fn to_value(&self) -> ::rowkeeper::Value {
                ::rowkeeper::Value::Integer(match self {
                    #(#to_arms,)*
                })
            }

            fn from_value(value: ::rowkeeper::Value) -> ::rowkeeper::Result<Self> {
                match value.as_i64() {
                    #(#from_arms,)*
                    _ => ::core::result::Result::Err(::rowkeeper::DbError::TypeMismatch(format!(
                        "{} is not a valid {}",
                        value,
                        stringify!(#enum_name)
                    ))),
                }
            }
        }

        impl ::rowkeeper::Symbolic for #enum_name {
            fn symbol_of(value: &::rowkeeper::Value) -> ::core::option::Option<&'static str> {
                match value.as_i64() {
                    #(#symbol_arms,)*
                    _ => ::core::option::Option::None,
                }
            }
        }
    })
}

fn parse_discriminant(expr: &Expr) -> syn::Result<i64> {
    match expr {
        Expr::Lit(lit) => match &lit.lit {
            Lit::Int(int) => int.base10_parse::<i64>(),
            other => Err(syn::Error::new(other.span(), "SqlEnum discriminants must be integers")),
        },
        Expr::Unary(unary) if matches!(unary.op, syn::UnOp::Neg(_)) => {
            parse_discriminant(&unary.expr).map(|value| -value)
        }
        other => Err(syn::Error::new(
            other.span(),
            "SqlEnum discriminants must be integer literals",
        )),
    }
}

fn to_pascal_case(value: &str) -> String {
    let mut out = String::new();
    for chunk in value.split('_').filter(|part| !part.is_empty()) {
        let mut chars = chunk.chars();
        if let Some(first) = chars.next() {
            out.extend(first.to_uppercase());
            out.push_str(chars.as_str());
        }
    }
    if out.is_empty() {
        value.to_string()
    } else {
        out
    }
}
