use crate::document::Value;
use crate::error::{MapperError, SyntaxError};
use crate::field_map::{
    Access, Cascade, CollectionMap, CollectionMode, ComponentMap, FieldHeader, FieldMap, Join, MergedCollectionMap,
    SimpleFieldMap,
};
use crate::lexer::{Lexer, Token, TokenType};
use crate::mapper::{EntityClassSpec, EntityMapper};
use crate::reflect::{FieldKind, Reflector};
use crate::typer::FieldType;
use crate::utils::excerpt;
use log::trace;
use miette::NamedSource;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;

/// Default bound on how deep `<>` follows component and collection metadata.
pub const DEFAULT_REFLECTION_DEPTH: usize = 4;

/// The class part of an entity spec, before its field-map list.
#[derive(Debug, Default)]
struct EntitySpec {
    /// `None` for the union of a merged collection.
    base: Option<EntityClassSpec>,
    /// Set instead of `base` when a collection names a built-in element type.
    primitive: Option<FieldType>,
    subclasses: Vec<EntityClassSpec>,
    discriminator: Option<String>,
}

/// The name part of a field map, before any `:` or `=`.
#[derive(Debug)]
struct FieldName {
    header: FieldHeader,
    identifier: bool,
    entity_name: bool,
    /// `merge as name`, whose only valid body is a merged collection.
    merge: bool,
}

/// A recursive descent parser for entity map specifications, built according to the EBNF grammar.
/// Each field-map list is validated by [`MapperBuilder::build`](crate::mapper::MapperBuilder::build)
/// as soon as it closes.
pub struct Parser<'a> {
    source: Arc<NamedSource<String>>,
    tokens: Vec<Token>,
    position: usize,
    source_text: &'a str,
    reflector: &'a dyn Reflector,
    /// `alias Full.Name as Short;` declarations, keyed by the short name.
    aliases: HashMap<String, String>,
    reflection_depth: usize,
}

impl<'a> Parser<'a> {
    pub fn new(source_text: &'a str, reflector: &'a dyn Reflector) -> Self {
        Self::new_with_name(source_text, "<mapping>".to_string(), reflector)
    }

    pub fn new_with_name(source_text: &'a str, name: String, reflector: &'a dyn Reflector) -> Self {
        let source = Arc::new(NamedSource::new(name, source_text.to_string()));
        let mut lexer = Lexer::new(source_text);
        let tokens: Vec<Token> = lexer
            .lex()
            .into_iter()
            .filter(|t| !matches!(t.ttype, TokenType::Whitespace | TokenType::Comment(_)))
            .collect();

        Self {
            source,
            tokens,
            position: 0,
            source_text,
            reflector,
            aliases: HashMap::new(),
            reflection_depth: DEFAULT_REFLECTION_DEPTH,
        }
    }

    pub fn with_reflection_depth(mut self, depth: usize) -> Self {
        self.reflection_depth = depth;
        self
    }

    // === Main Parsing Methods ===

    /// Mapping ::= { AliasDecl } ( "<" Class ">" | EntitySpec FieldMapList ) EOF
    /// AliasDecl ::= "alias" Identifier "as" Identifier ";"
    pub fn parse_mapping(&mut self) -> Result<EntityMapper, MapperError> {
        while self.match_token(TokenType::Alias) {
            let (full_name, _) = self.expect_identifier()?;
            self.expect(TokenType::As)?;
            let (alias, _) = self.expect_raw_identifier()?;
            self.expect(TokenType::Semicolon)?;
            self.aliases.insert(alias, full_name);
        }

        let mapper = match self.current_token()?.ttype {
            TokenType::LAngle => self.parse_reflected_entity()?,
            TokenType::Identifier(_) => {
                let spec = self.parse_entity_spec(true, false)?;
                self.parse_field_map_list(spec, None)?
            }
            _ => return self.err_unexpected("open-angle-bracket or identifier"),
        };

        self.expect(TokenType::Eof)?;
        Ok(mapper)
    }

    /// ReflectedEntity ::= "<" Class ">"
    fn parse_reflected_entity(&mut self) -> Result<EntityMapper, MapperError> {
        self.expect(TokenType::LAngle)?;
        let (name, token) = self.expect_raw_identifier()?;
        let spec = self.resolve_entity_class(&name, &token)?;
        self.expect(TokenType::RAngle)?;
        let fields = self.reflect_fields(spec.class_name(), 0)?;
        Ok(EntityMapper::builder(spec).map_all(fields).build(self.reflector)?)
    }

    /// EntitySpec ::= Class [ "unlocalised" ] [ "(" Class { "|" Class } [ "as" Identifier ] ")" ]
    fn parse_entity_spec(&mut self, allow_variants: bool, allow_primitive: bool) -> Result<EntitySpec, MapperError> {
        let (name, token) = self.expect_raw_identifier()?;
        let unlocalised = self.match_token(TokenType::Unlocalised);

        let mut spec = EntitySpec::default();
        match self.builtin_type(&name).filter(|_| allow_primitive) {
            Some(primitive) => spec.primitive = Some(primitive),
            None => {
                let base = self.resolve_entity_class(&name, &token)?;
                spec.base = Some(if unlocalised { base.unlocalised() } else { base });
            }
        }

        if allow_variants && self.match_token(TokenType::LParen) {
            loop {
                let (name, token) = self.expect_raw_identifier()?;
                spec.subclasses.push(self.resolve_entity_class(&name, &token)?);
                if self.match_token(TokenType::As) {
                    let (discriminator, _) = self.expect_identifier()?;
                    spec.discriminator = Some(discriminator);
                    if !self.check(TokenType::RParen) {
                        return self.err_unexpected("close-parenthesis");
                    }
                }
                match self.current_token()?.ttype {
                    TokenType::OrBar => self.advance(),
                    TokenType::RParen => {
                        self.advance();
                        break;
                    }
                    _ => return self.err_unexpected("or-bar or close-parenthesis"),
                }
            }
        }
        Ok(spec)
    }

    /// FieldMapList ::= "{" [ FieldMap { "," FieldMap } ] "}"
    fn parse_field_map_list(&mut self, spec: EntitySpec, plugin: Option<&str>) -> Result<EntityMapper, MapperError> {
        let EntitySpec {
            base,
            subclasses,
            discriminator,
            ..
        } = spec;
        let class = base.as_ref().map(|b| b.class_name().to_string());
        let mut builder = match base {
            Some(base) => EntityMapper::builder(base),
            None => EntityMapper::union_builder(),
        };
        for subclass in subclasses {
            builder = builder.subclass(subclass);
        }
        if let Some(discriminator) = &discriminator {
            builder = builder.discriminate_by(discriminator);
        }

        self.expect(TokenType::LBrace)?;
        if !self.match_token(TokenType::RBrace) {
            loop {
                builder = builder.map_all(self.parse_field_map(class.as_deref(), plugin)?);
                match self.current_token()?.ttype {
                    TokenType::Comma => self.advance(),
                    TokenType::RBrace => {
                        self.advance();
                        break;
                    }
                    _ => return self.err_unexpected("comma or close-brace"),
                }
            }
        }
        Ok(builder.build(self.reflector)?)
    }

    /// FieldMap ::= "<>" | FieldSpec ( ":" ComplexMap | [ "=" Literal ] )
    ///
    /// `class` is `None` inside the union of a merged collection, where every
    /// field must be a variant collection.
    fn parse_field_map(&mut self, class: Option<&str>, plugin: Option<&str>) -> Result<Vec<FieldMap>, MapperError> {
        let Some(class) = class else {
            return self.parse_union_field_map();
        };

        if self.match_token(TokenType::Reflection) {
            return self.reflect_fields(class, 0);
        }
        if !self.check_field_start() {
            return self.err_unexpected(
                "readonly or final or createonly or writeonly or sensitive or exclusive or identifier or \
                 open-parenthesis or open-square-bracket or attribute-indicator or merge or reflection-operator",
            );
        }

        let name = self.parse_field_spec(plugin)?;
        let field = if self.match_token(TokenType::Colon) {
            self.parse_complex_map(name)?
        } else {
            let mut simple = SimpleFieldMap::new(name.header);
            simple.identifier = name.identifier;
            simple.entity_name = name.entity_name;
            if self.match_token(TokenType::Equals) {
                simple.default = Some(self.parse_literal()?);
            }
            simple.into()
        };
        Ok(vec![field])
    }

    /// UnionFieldMap ::= FieldOptions Identifier [ "as" Identifier ] ":" CollectionMap
    fn parse_union_field_map(&mut self) -> Result<Vec<FieldMap>, MapperError> {
        let starts_field = self.check_access() || self.check(TokenType::Exclusive) || self.check_identifier();
        if !starts_field {
            return self.err_unexpected(
                "readonly or final or createonly or writeonly or sensitive or exclusive or identifier",
            );
        }
        let (access, exclusive) = self.parse_field_options()?;
        let (spelling, _) = self.expect_raw_identifier()?;
        let internal = self.resolve_alias(&spelling).to_string();
        let external = self.parse_optional_rename()?.unwrap_or(spelling);
        let mut header = FieldHeader::renamed(&internal, &external).access(access);
        header.exclusive = exclusive;

        self.expect(TokenType::Colon)?;
        if !self.check(TokenType::LBracket) {
            return self.err_unexpected("open-square-bracket");
        }
        Ok(vec![self.parse_collection_map(header)?])
    }

    /// FieldSpec ::= FieldOptions ( Name | "(" Name ")" | "[" Name "]" | "@" Plugin ":" Name | "merge" ) [ "as" Identifier ]
    fn parse_field_spec(&mut self, plugin: Option<&str>) -> Result<FieldName, MapperError> {
        let (access, exclusive) = self.parse_field_options()?;
        let mut identifier = false;
        let mut entity_name = false;
        let mut merge = false;
        let mut field_plugin = plugin.map(str::to_string);
        let mut is_attribute = false;

        let token = self.current_token()?.clone();
        let spelling = match token.ttype {
            TokenType::LParen | TokenType::LBracket => {
                identifier = token.ttype == TokenType::LParen;
                entity_name = !identifier;
                self.advance();
                let (name, _) = self.expect_raw_identifier()?;
                match self.current_token()?.ttype {
                    TokenType::RParen | TokenType::RBracket => self.advance(),
                    _ => return self.err_unexpected("close-parenthesis or close-square-bracket"),
                }
                name
            }
            TokenType::At => {
                if plugin.is_some() {
                    return Err(SyntaxError::NestedAttribute {
                        src: (*self.source).clone(),
                        span: (token.pos_start, token.pos_end - token.pos_start).into(),
                        excerpt: excerpt(self.source_text, token.pos_end),
                    }
                    .into());
                }
                self.advance();
                let (plugin_name, _) = self.expect_identifier()?;
                self.expect(TokenType::Colon)?;
                let (name, _) = self.expect_raw_identifier()?;
                field_plugin = Some(plugin_name);
                is_attribute = true;
                name
            }
            TokenType::Merge => {
                self.advance();
                if !self.check(TokenType::As) {
                    return self.err_unexpected("as");
                }
                merge = true;
                String::new()
            }
            // a keyword after the field options is taken as the name
            _ => {
                let name = self.raw_text(&token);
                if !name.starts_with(|c: char| c.is_ascii_alphabetic() || c == '_') {
                    return self.err_unexpected("identifier");
                }
                self.advance();
                name.to_string()
            }
        };

        let internal = self.resolve_alias(&spelling).to_string();
        let external = self.parse_optional_rename()?.unwrap_or(spelling);
        let internal = if merge { external.clone() } else { internal };
        let mut header = FieldHeader::renamed(&internal, &external).access(access);
        header.exclusive = exclusive;
        header.plugin = field_plugin;
        header.is_attribute = is_attribute;

        Ok(FieldName {
            header,
            identifier,
            entity_name,
            merge,
        })
    }

    /// FieldOptions ::= set( "exclusive" | Access )
    /// Access ::= "readonly" | "final" | "createonly" | "writeonly" | "sensitive"
    fn parse_field_options(&mut self) -> Result<(Access, bool), MapperError> {
        let mut access = None;
        let mut exclusive = false;
        loop {
            let next = match self.current_token()?.ttype {
                TokenType::Exclusive if !exclusive => {
                    exclusive = true;
                    None
                }
                TokenType::ReadOnly if access.is_none() => Some(Access::ReadOnly),
                TokenType::Final if access.is_none() => Some(Access::Final),
                TokenType::CreateOnly if access.is_none() => Some(Access::CreateOnly),
                TokenType::WriteOnly if access.is_none() => Some(Access::WriteOnly),
                TokenType::Sensitive if access.is_none() => Some(Access::Sensitive),
                _ => break,
            };
            access = access.or(next);
            self.advance();
        }
        Ok((access.unwrap_or_default(), exclusive))
    }

    /// ComplexMap ::= MergedCollectionMap | CollectionMap | ComponentMap
    fn parse_complex_map(&mut self, name: FieldName) -> Result<FieldMap, MapperError> {
        if name.merge {
            if !self.check(TokenType::LBracket) {
                return self.err_unexpected("open-square-bracket");
            }
            return self.parse_merged_collection_map(name.header);
        }
        match self.current_token()?.ttype {
            TokenType::LBracket => self.parse_collection_map(name.header),
            TokenType::LAngle
            | TokenType::Subclass
            | TokenType::Optional
            | TokenType::Flattened
            | TokenType::Identifier(_) => self.parse_component_map(name.header),
            _ => self.err_unexpected(
                "open-square-bracket or open-angle-bracket or subclass or optional or flattened or identifier",
            ),
        }
    }

    /// CollectionMap ::= "[" [ "lazy" | "eager" ] ( "<" Class ">" | EntitySpec ) [ JoinSpec [ CascadeSpec ] ] "]" [ FieldMapList ]
    ///
    /// The field-map list is omitted for reflected and built-in element types.
    fn parse_collection_map(&mut self, header: FieldHeader) -> Result<FieldMap, MapperError> {
        self.expect(TokenType::LBracket)?;
        let mode = self.parse_collection_mode();
        let plugin = header.plugin.clone();

        if self.check(TokenType::LAngle) {
            let mapper = self.parse_reflected_entity()?;
            let (join, cascade) = self.parse_collection_join()?;
            self.expect(TokenType::RBracket)?;
            let collection = CollectionMap::entities(header, mapper).mode(mode);
            return Ok(with_collection_join(collection, join, cascade).into());
        }

        if !self.check_identifier() {
            return self.err_unexpected("open-angle-bracket or identifier");
        }
        let spec = self.parse_entity_spec(true, true)?;
        let (join, cascade) = self.parse_collection_join()?;
        self.expect(TokenType::RBracket)?;

        let collection = match spec.primitive {
            Some(element) => CollectionMap::primitives(header, element),
            None => CollectionMap::entities(header, self.parse_field_map_list(spec, plugin.as_deref())?),
        };
        Ok(with_collection_join(collection.mode(mode), join, cascade).into())
    }

    /// MergedCollectionMap ::= "[" [ "lazy" | "eager" ] Class { "|" Class } [ "as" Identifier ]
    ///                         [ "indexed" "by" Identifier ] [ "using" Identifier ] "]" FieldMapList
    fn parse_merged_collection_map(&mut self, header: FieldHeader) -> Result<FieldMap, MapperError> {
        self.expect(TokenType::LBracket)?;
        let mode = self.parse_collection_mode();

        let mut spec = EntitySpec::default();
        loop {
            let (name, token) = self.expect_raw_identifier()?;
            spec.subclasses.push(self.resolve_entity_class(&name, &token)?);
            if !self.match_token(TokenType::OrBar) {
                break;
            }
        }
        if self.match_token(TokenType::As) {
            spec.discriminator = Some(self.expect_identifier()?.0);
        }
        let indexed_by = if self.match_token(TokenType::Indexed) {
            self.expect(TokenType::By)?;
            Some(self.expect_identifier()?.0)
        } else {
            None
        };
        let handler = if self.match_token(TokenType::Using) {
            Some(self.expect_identifier()?.0)
        } else {
            None
        };
        self.expect(TokenType::RBracket)?;

        let union = self.parse_field_map_list(spec, None)?;
        let mut merged = MergedCollectionMap::new(header, union, mode);
        if let Some(field) = &indexed_by {
            merged = merged.indexed_by(field);
        }
        if let Some(handler) = &handler {
            merged = merged.using(handler);
        }
        Ok(merged.into())
    }

    /// ComponentMap ::= "subclass" EntitySpec FieldMapList
    ///                | set( "optional" | "flattened" ) ( "<" Class ">" | EntitySpec ) [ JoinSpec ] [ CascadeSpec ] [ FieldMapList ]
    fn parse_component_map(&mut self, header: FieldHeader) -> Result<FieldMap, MapperError> {
        let plugin = header.plugin.clone();

        if self.match_token(TokenType::Subclass) {
            let spec = self.parse_entity_spec(false, false)?;
            let mapper = self.parse_field_map_list(spec, plugin.as_deref())?;
            return Ok(ComponentMap::subclass(header, mapper).into());
        }

        let mut optional = false;
        let mut flattened = false;
        loop {
            match self.current_token()?.ttype {
                TokenType::Optional if !optional => optional = true,
                TokenType::Flattened if !flattened => flattened = true,
                _ => break,
            }
            self.advance();
        }

        let mut component = match self.current_token()?.ttype {
            TokenType::LAngle => {
                let mapper = self.parse_reflected_entity()?;
                let (join, cascade) = self.parse_component_join()?;
                with_component_join(ComponentMap::new(header, mapper), join, cascade)
            }
            TokenType::Identifier(_) => {
                let spec = self.parse_entity_spec(true, false)?;
                let (join, cascade) = self.parse_component_join()?;
                let mapper = self.parse_field_map_list(spec, plugin.as_deref())?;
                with_component_join(ComponentMap::new(header, mapper), join, cascade)
            }
            _ => return self.err_unexpected("open-angle-bracket or subclass or identifier"),
        };

        if optional {
            component = component.optional();
        }
        if flattened {
            component = component.flattened();
        }
        Ok(component.into())
    }

    // === EBNF Sub-Rules ===

    /// Mode ::= "lazy" | "eager"
    fn parse_collection_mode(&mut self) -> CollectionMode {
        if self.match_token(TokenType::Eager) {
            CollectionMode::Eager
        } else {
            self.match_token(TokenType::Lazy);
            CollectionMode::Lazy
        }
    }

    /// A collection only takes a cascade after a join.
    fn parse_collection_join(&mut self) -> Result<(Option<Join>, Option<Cascade>), MapperError> {
        if !self.check(TokenType::Join) {
            return Ok((None, None));
        }
        let join = self.parse_join_spec()?;
        let cascade = self.parse_optional_cascade()?;
        Ok((Some(join), cascade))
    }

    fn parse_component_join(&mut self) -> Result<(Option<Join>, Option<Cascade>), MapperError> {
        let join = if self.check(TokenType::Join) {
            Some(self.parse_join_spec()?)
        } else {
            None
        };
        let cascade = self.parse_optional_cascade()?;
        Ok((join, cascade))
    }

    /// JoinSpec ::= "join" Identifier "->" Identifier [ "using" Identifier ]
    fn parse_join_spec(&mut self) -> Result<Join, MapperError> {
        self.expect(TokenType::Join)?;
        let (foreign_key, _) = self.expect_identifier()?;
        self.expect(TokenType::Reference)?;
        let (parent_key, _) = self.expect_identifier()?;
        let mut join = Join::new(&foreign_key, Some(&parent_key));
        if self.match_token(TokenType::Using) {
            let (handler, _) = self.expect_identifier()?;
            join = join.using(&handler);
        }
        Ok(join)
    }

    /// CascadeSpec ::= "with" ( "cascade-update" | "cascade-delete" | "cascade-all" )
    fn parse_optional_cascade(&mut self) -> Result<Option<Cascade>, MapperError> {
        if !self.match_token(TokenType::With) {
            return Ok(None);
        }
        let cascade = match self.current_token()?.ttype {
            TokenType::CascadeUpdate => Cascade::Update,
            TokenType::CascadeDelete => Cascade::Delete,
            TokenType::CascadeAll => Cascade::All,
            _ => return self.err_unexpected("cascade-update or cascade-delete or cascade-all"),
        };
        self.advance();
        Ok(Some(cascade))
    }

    /// Rename ::= [ "as" Identifier ]
    fn parse_optional_rename(&mut self) -> Result<Option<String>, MapperError> {
        if self.match_token(TokenType::As) {
            Ok(Some(self.expect_identifier()?.0))
        } else {
            Ok(None)
        }
    }

    /// Literal ::= StringLiteral | IntegerLiteral | DecimalLiteral | "true" | "false"
    fn parse_literal(&mut self) -> Result<Value, MapperError> {
        let token = self.current_token()?.clone();
        let value = match &token.ttype {
            TokenType::StringLiteral(s) => Value::Str(s.clone()),
            TokenType::IntegerLiteral(digits) => match digits.parse::<i64>() {
                Ok(i) => Value::Int(i),
                Err(e) => return Err(self.invalid_literal(&token, &e.to_string())),
            },
            TokenType::DecimalLiteral(text) => {
                let normalised = if text.starts_with('.') {
                    format!("0{}", text)
                } else {
                    text.clone()
                };
                match Decimal::from_str(&normalised) {
                    Ok(d) => Value::Decimal(d),
                    Err(e) => return Err(self.invalid_literal(&token, &e.to_string())),
                }
            }
            TokenType::True => Value::Bool(true),
            TokenType::False => Value::Bool(false),
            _ => {
                return self.err_unexpected("string-literal or integer-literal or decimal-literal or true or false");
            }
        };
        self.advance();
        Ok(value)
    }

    // === Class Resolution ===

    fn resolve_alias<'n>(&'n self, name: &'n str) -> &'n str {
        self.aliases.get(name).map_or(name, String::as_str)
    }

    fn builtin_type(&self, name: &str) -> Option<FieldType> {
        FieldType::builtin(self.resolve_alias(name))
    }

    /// Resolves a class name, through the alias table, to a class the
    /// reflector knows. The spelling used in the mapping becomes the alias.
    fn resolve_entity_class(&self, name: &str, token: &Token) -> Result<EntityClassSpec, MapperError> {
        let class = self.resolve_alias(name);
        if !self.reflector.has_class(class) {
            return Err(SyntaxError::UnknownClass {
                src: (*self.source).clone(),
                span: (token.pos_start, token.pos_end - token.pos_start).into(),
                class: class.to_string(),
            }
            .into());
        }
        Ok(EntityClassSpec::aliased(class, name))
    }

    /// Expands `<>` for `class`: every persistent field becomes a field map,
    /// following components and entity collections until the depth bound.
    fn reflect_fields(&self, class: &str, depth: usize) -> Result<Vec<FieldMap>, MapperError> {
        if depth >= self.reflection_depth {
            return Ok(Vec::new());
        }
        let mut fields = Vec::new();
        for meta in self.reflector.fields_of(class) {
            let field: FieldMap = match (meta.kind, meta.target_class.as_deref()) {
                (kind, None) if kind.is_collection() => match meta.value_type {
                    Some(element) => CollectionMap::primitives(FieldHeader::new(&meta.internal_name), element).into(),
                    None => continue,
                },
                (kind, Some(target)) if kind.is_collection() => {
                    let nested = self.reflect_mapper(target, depth + 1)?;
                    CollectionMap::entities(FieldHeader::new(&meta.internal_name), nested).into()
                }
                (FieldKind::Component | FieldKind::ManyToOne, Some(target)) => {
                    let nested = self.reflect_mapper(target, depth + 1)?;
                    ComponentMap::new(FieldHeader::new(&meta.internal_name), nested).into()
                }
                (FieldKind::Simple, _) => {
                    let simple = SimpleFieldMap::new(FieldHeader::renamed(&meta.internal_name, &meta.external_name));
                    if meta.primary_key {
                        simple.identifier().into()
                    } else {
                        simple.into()
                    }
                }
                _ => continue,
            };
            fields.push(field);
        }
        Ok(fields)
    }

    fn reflect_mapper(&self, class: &str, depth: usize) -> Result<EntityMapper, MapperError> {
        let fields = self.reflect_fields(class, depth)?;
        Ok(EntityMapper::builder(EntityClassSpec::new(class))
            .map_all(fields)
            .build(self.reflector)?)
    }

    // === Tokenizer Helper Methods ===

    /// Unrecognised input is only reported once the parser reaches it.
    fn current_token(&self) -> Result<&Token, MapperError> {
        let token = match self.tokens.get(self.position) {
            Some(token) => token,
            None => return self.err_unexpected_end(),
        };
        match token.ttype {
            TokenType::Unknown => Err(SyntaxError::UnrecognisedToken {
                src: (*self.source).clone(),
                span: (token.pos_start, 1).into(),
                excerpt: excerpt(self.source_text, token.pos_start),
            }
            .into()),
            TokenType::UnclosedComment => Err(SyntaxError::UnterminatedComment {
                src: (*self.source).clone(),
                span: (token.pos_start, 2).into(),
            }
            .into()),
            _ => Ok(token),
        }
    }

    fn advance(&mut self) {
        if let Some(token) = self.tokens.get(self.position) {
            trace!("consumed {} at {}", token.ttype, token.pos_start);
        }
        if self.position < self.tokens.len() {
            self.position += 1;
        }
    }

    fn expect(&mut self, expected: TokenType) -> Result<(), MapperError> {
        if self.check(expected.clone()) {
            self.advance();
            Ok(())
        } else {
            self.err_unexpected(&expected.to_string())
        }
    }

    /// An identifier with any alias substituted.
    fn expect_identifier(&mut self) -> Result<(String, Token), MapperError> {
        let (name, token) = self.expect_raw_identifier()?;
        let name = self.resolve_alias(&name).to_string();
        Ok((name, token))
    }

    /// An identifier as spelled in the mapping.
    fn expect_raw_identifier(&mut self) -> Result<(String, Token), MapperError> {
        let token = self.current_token()?.clone();
        match &token.ttype {
            TokenType::Identifier(name) => {
                let name = name.clone();
                self.advance();
                Ok((name, token))
            }
            _ => self.err_unexpected("identifier"),
        }
    }

    fn match_token(&mut self, ttype: TokenType) -> bool {
        if self.check(ttype) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn check(&self, ttype: TokenType) -> bool {
        if let Ok(token) = self.current_token() {
            std::mem::discriminant(&token.ttype) == std::mem::discriminant(&ttype)
        } else {
            false
        }
    }

    fn check_identifier(&self) -> bool {
        self.check(TokenType::Identifier(String::new()))
    }

    fn check_access(&self) -> bool {
        self.check(TokenType::ReadOnly)
            || self.check(TokenType::Final)
            || self.check(TokenType::CreateOnly)
            || self.check(TokenType::WriteOnly)
            || self.check(TokenType::Sensitive)
    }

    fn check_field_start(&self) -> bool {
        self.check_access()
            || self.check_identifier()
            || self.check(TokenType::Exclusive)
            || self.check(TokenType::LParen)
            || self.check(TokenType::LBracket)
            || self.check(TokenType::At)
            || self.check(TokenType::Merge)
    }

    fn raw_text(&self, token: &Token) -> &'a str {
        &self.source_text[token.pos_start..token.pos_end]
    }

    fn err_unexpected<T>(&self, expected: &str) -> Result<T, MapperError> {
        let token = self.current_token()?;
        Err(SyntaxError::UnexpectedToken {
            src: (*self.source).clone(),
            span: (token.pos_start, token.pos_end - token.pos_start).into(),
            expected: expected.to_string(),
            found: self.raw_text(token).to_string(),
            excerpt: excerpt(self.source_text, token.pos_end),
        }
        .into())
    }

    fn err_unexpected_end<T>(&self) -> Result<T, MapperError> {
        let pos = self.source_text.len();
        Err(SyntaxError::UnexpectedToken {
            src: (*self.source).clone(),
            span: (pos, 0).into(),
            expected: "more input".to_string(),
            found: TokenType::Eof.to_string(),
            excerpt: String::new(),
        }
        .into())
    }

    fn invalid_literal(&self, token: &Token, reason: &str) -> MapperError {
        SyntaxError::InvalidLiteral {
            src: (*self.source).clone(),
            span: (token.pos_start, token.pos_end - token.pos_start).into(),
            literal: self.raw_text(token).to_string(),
            reason: reason.to_string(),
        }
        .into()
    }
}

fn with_collection_join(mut collection: CollectionMap, join: Option<Join>, cascade: Option<Cascade>) -> CollectionMap {
    if let Some(join) = join {
        collection = collection.joined(join);
    }
    if let Some(cascade) = cascade {
        collection = collection.cascading(cascade);
    }
    collection
}

fn with_component_join(mut component: ComponentMap, join: Option<Join>, cascade: Option<Cascade>) -> ComponentMap {
    if let Some(join) = join {
        component = component.joined(join);
    }
    if let Some(cascade) = cascade {
        component = component.cascading(cascade);
    }
    component
}
