//! The loaded, validated program with precomputed name indices.
//!
//! `Program::new` takes the declaration list produced by the external
//! parsing/resolution stage, checks it for duplicates and dangling
//! references, and builds owned lookup indices once so that evaluation
//! never re-filters the declaration list.

use std::collections::HashMap;

use crate::ast::*;
use crate::error::ProgramError;

/// A region together with its owning country.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegionDecl {
    pub name: String,
    pub country: String,
}

/// A city together with its owning region.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CityDecl {
    pub name: String,
    pub region: String,
}

/// An immutable, validated program. Declaration order is preserved in
/// every vector; the hash indices are lookup-only and never iterated.
#[derive(Debug, Clone)]
pub struct Program {
    countries: Vec<CountryDecl>,
    regions: Vec<RegionDecl>,
    cities: Vec<CityDecl>,
    company_types: Vec<CompanyTypeDecl>,
    entities: Vec<EntityDecl>,
    taxes: Vec<TaxDecl>,
    country_index: HashMap<String, usize>,
    region_index: HashMap<String, usize>,
    city_index: HashMap<String, usize>,
    company_type_index: HashMap<String, usize>,
    entity_index: HashMap<String, usize>,
    tax_index: HashMap<String, usize>,
}

impl Program {
    pub fn new(declarations: Vec<Declaration>) -> Result<Program, ProgramError> {
        let mut program = Program {
            countries: Vec::new(),
            regions: Vec::new(),
            cities: Vec::new(),
            company_types: Vec::new(),
            entities: Vec::new(),
            taxes: Vec::new(),
            country_index: HashMap::new(),
            region_index: HashMap::new(),
            city_index: HashMap::new(),
            company_type_index: HashMap::new(),
            entity_index: HashMap::new(),
            tax_index: HashMap::new(),
        };

        for decl in declarations {
            match decl {
                Declaration::Countries(countries) => {
                    for c in countries {
                        insert_unique(
                            &mut program.country_index,
                            "country",
                            &c.name,
                            program.countries.len(),
                        )?;
                        program.countries.push(c);
                    }
                }
                Declaration::Regions { country, names } => {
                    if !program.country_index.contains_key(&country) {
                        return Err(ProgramError::Unresolved {
                            kind: "country",
                            name: country,
                        });
                    }
                    for name in names {
                        insert_unique(
                            &mut program.region_index,
                            "region",
                            &name,
                            program.regions.len(),
                        )?;
                        program.regions.push(RegionDecl {
                            name,
                            country: country.clone(),
                        });
                    }
                }
                Declaration::Cities { region, names } => {
                    if !program.region_index.contains_key(&region) {
                        return Err(ProgramError::Unresolved {
                            kind: "region",
                            name: region,
                        });
                    }
                    for name in names {
                        insert_unique(
                            &mut program.city_index,
                            "city",
                            &name,
                            program.cities.len(),
                        )?;
                        program.cities.push(CityDecl {
                            name,
                            region: region.clone(),
                        });
                    }
                }
                Declaration::CompanyType(ct) => {
                    insert_unique(
                        &mut program.company_type_index,
                        "company type",
                        &ct.name,
                        program.company_types.len(),
                    )?;
                    program.company_types.push(ct);
                }
                Declaration::Entity(entity) => {
                    insert_unique(
                        &mut program.entity_index,
                        "entity",
                        &entity.name,
                        program.entities.len(),
                    )?;
                    check_unique_fields("entity", &entity.name, &entity.fields)?;
                    program.entities.push(entity);
                }
                Declaration::Tax(tax) => {
                    insert_unique(&mut program.tax_index, "tax", &tax.name, program.taxes.len())?;
                    check_unique_fields("tax", &tax.name, &tax.fields)?;
                    program.taxes.push(tax);
                }
            }
        }

        program.validate()?;
        Ok(program)
    }

    // ── Lookup ──

    pub fn countries(&self) -> &[CountryDecl] {
        &self.countries
    }

    pub fn regions(&self) -> &[RegionDecl] {
        &self.regions
    }

    pub fn cities(&self) -> &[CityDecl] {
        &self.cities
    }

    pub fn entities(&self) -> &[EntityDecl] {
        &self.entities
    }

    pub fn taxes(&self) -> &[TaxDecl] {
        &self.taxes
    }

    pub fn persons(&self) -> impl Iterator<Item = &EntityDecl> {
        self.entities.iter().filter(|e| e.is_person())
    }

    pub fn companies(&self) -> impl Iterator<Item = &EntityDecl> {
        self.entities.iter().filter(|e| e.is_company())
    }

    pub fn country(&self, name: &str) -> Option<&CountryDecl> {
        self.country_index.get(name).map(|&i| &self.countries[i])
    }

    pub fn region(&self, name: &str) -> Option<&RegionDecl> {
        self.region_index.get(name).map(|&i| &self.regions[i])
    }

    pub fn city(&self, name: &str) -> Option<&CityDecl> {
        self.city_index.get(name).map(|&i| &self.cities[i])
    }

    pub fn entity(&self, name: &str) -> Option<&EntityDecl> {
        self.entity_index.get(name).map(|&i| &self.entities[i])
    }

    pub fn tax(&self, name: &str) -> Option<&TaxDecl> {
        self.tax_index.get(name).map(|&i| &self.taxes[i])
    }

    // ── Derived geography views ──

    pub fn regions_of(&self, country: &str) -> Vec<&RegionDecl> {
        self.regions.iter().filter(|r| r.country == country).collect()
    }

    pub fn cities_of_region(&self, region: &str) -> Vec<&CityDecl> {
        self.cities.iter().filter(|c| c.region == region).collect()
    }

    pub fn cities_of_country(&self, country: &str) -> Vec<&CityDecl> {
        self.cities
            .iter()
            .filter(|c| {
                self.region(&c.region)
                    .map(|r| r.country == country)
                    .unwrap_or(false)
            })
            .collect()
    }

    /// The country a city belongs to, through its region.
    pub fn country_of_city(&self, city: &str) -> Option<&CountryDecl> {
        let region = self.region(&self.city(city)?.region)?;
        self.country(&region.country)
    }

    // ── Validation ──

    fn validate(&self) -> Result<(), ProgramError> {
        for entity in &self.entities {
            if let EntityKind::Company(ct) = &entity.kind {
                if !self.company_type_index.contains_key(ct) {
                    return Err(ProgramError::Unresolved {
                        kind: "company type",
                        name: ct.clone(),
                    });
                }
            }
            for field in &entity.fields {
                self.validate_field(Some(entity), field)?;
            }
        }
        for tax in &self.taxes {
            if let EntityKind::Company(ct) = &tax.target {
                if !self.company_type_index.contains_key(ct) {
                    return Err(ProgramError::Unresolved {
                        kind: "company type",
                        name: ct.clone(),
                    });
                }
            }
            for field in &tax.fields {
                self.validate_field(None, field)?;
            }
        }
        Ok(())
    }

    fn validate_field(
        &self,
        owner: Option<&EntityDecl>,
        field: &FieldDecl,
    ) -> Result<(), ProgramError> {
        if let Some(expr) = &field.expr {
            self.validate_expr(expr)?;
        }
        if let Some(contribution) = &field.contribution {
            match contribution {
                Contribution::SameEntity { field } => {
                    if let Some(owner) = owner {
                        if owner.field(field).is_none() {
                            return Err(ProgramError::UnknownField {
                                entity: owner.name.clone(),
                                field: field.clone(),
                            });
                        }
                    }
                }
                Contribution::OtherEntity { entity, field } => {
                    let target =
                        self.entity(entity)
                            .ok_or_else(|| ProgramError::Unresolved {
                                kind: "entity",
                                name: entity.clone(),
                            })?;
                    if target.field(field).is_none() {
                        return Err(ProgramError::UnknownField {
                            entity: entity.clone(),
                            field: field.clone(),
                        });
                    }
                }
                // The receiving owners are only known at evaluation
                // time, through the company's shares map.
                Contribution::Owners { .. } => {}
            }
        }
        Ok(())
    }

    fn validate_expr(&self, expr: &Expr) -> Result<(), ProgramError> {
        match expr {
            Expr::Int(_) | Expr::Decimal(_) | Expr::Percentage(_) => Ok(()),
            Expr::Reference(r) => self.validate_reference(r),
            Expr::Shares(entries) => {
                let mut seen: Vec<&str> = Vec::new();
                for entry in entries {
                    if !self.entity_index.contains_key(&entry.owner) {
                        return Err(ProgramError::Unresolved {
                            kind: "entity",
                            name: entry.owner.clone(),
                        });
                    }
                    if seen.contains(&entry.owner.as_str()) {
                        return Err(ProgramError::Malformed {
                            message: format!("duplicate shares-map owner '{}'", entry.owner),
                        });
                    }
                    seen.push(&entry.owner);
                    self.validate_expr(&entry.share)?;
                }
                Ok(())
            }
            Expr::Sum(a, b) | Expr::Equality(a, b) => {
                self.validate_expr(a)?;
                self.validate_expr(b)
            }
            Expr::PercentOf { percent, base } => {
                self.validate_expr(percent)?;
                self.validate_expr(base)
            }
            Expr::FieldAccess { scope, .. } => self.validate_expr(scope),
            Expr::When(clauses) => {
                for c in clauses {
                    self.validate_expr(&c.condition)?;
                    self.validate_expr(&c.value)?;
                }
                Ok(())
            }
            Expr::Windowed(clauses) => {
                for c in clauses {
                    self.validate_expr(&c.value)?;
                }
                Ok(())
            }
            Expr::Periodic { value, .. } => self.validate_expr(value),
            Expr::Brackets(entries) => self.validate_brackets(entries),
            Expr::ApplyBrackets { brackets, amount } => {
                self.validate_expr(brackets)?;
                self.validate_expr(amount)
            }
        }
    }

    fn validate_reference(&self, reference: &Reference) -> Result<(), ProgramError> {
        match reference {
            Reference::Entity(name) => self.require(&self.entity_index, "entity", name),
            Reference::EntityField { entity, field } => {
                let decl = self
                    .entity(entity)
                    .ok_or_else(|| ProgramError::Unresolved {
                        kind: "entity",
                        name: entity.clone(),
                    })?;
                if decl.field(field).is_none() {
                    return Err(ProgramError::UnknownField {
                        entity: entity.clone(),
                        field: field.clone(),
                    });
                }
                Ok(())
            }
            // The field may live on the tax or fall back to the entity
            // under assessment, so only the tax name is checkable here.
            Reference::TaxField { tax, .. } => self.require(&self.tax_index, "tax", tax),
            Reference::Country(name) => self.require(&self.country_index, "country", name),
            Reference::Region(name) => self.require(&self.region_index, "region", name),
            Reference::City(name) => self.require(&self.city_index, "city", name),
        }
    }

    fn validate_brackets(&self, entries: &[BracketEntry]) -> Result<(), ProgramError> {
        let mut prev_limit: Option<rust_decimal::Decimal> = None;
        for (i, entry) in entries.iter().enumerate() {
            match &entry.limit {
                BracketLimit::Above => {
                    if i + 1 != entries.len() {
                        return Err(ProgramError::Malformed {
                            message: "open-ended bracket must be last".to_string(),
                        });
                    }
                }
                BracketLimit::To(limit) => {
                    self.validate_expr(limit)?;
                    // Ascending order is checkable only for literal limits.
                    let literal = match limit {
                        Expr::Int(n) => Some(rust_decimal::Decimal::from(*n)),
                        Expr::Decimal(d) => Some(*d),
                        _ => None,
                    };
                    if let (Some(prev), Some(cur)) = (prev_limit, literal) {
                        if cur <= prev {
                            return Err(ProgramError::Malformed {
                                message: format!(
                                    "bracket limits must be ascending: {} after {}",
                                    cur, prev
                                ),
                            });
                        }
                    }
                    prev_limit = literal.or(prev_limit);
                }
            }
            self.validate_expr(&entry.value)?;
        }
        Ok(())
    }

    fn require(
        &self,
        index: &HashMap<String, usize>,
        kind: &'static str,
        name: &str,
    ) -> Result<(), ProgramError> {
        if index.contains_key(name) {
            Ok(())
        } else {
            Err(ProgramError::Unresolved {
                kind,
                name: name.to_string(),
            })
        }
    }
}

fn insert_unique(
    index: &mut HashMap<String, usize>,
    kind: &'static str,
    name: &str,
    slot: usize,
) -> Result<(), ProgramError> {
    if index.insert(name.to_string(), slot).is_some() {
        return Err(ProgramError::Duplicate {
            kind,
            name: name.to_string(),
        });
    }
    Ok(())
}

fn check_unique_fields(
    kind: &'static str,
    owner: &str,
    fields: &[FieldDecl],
) -> Result<(), ProgramError> {
    for (i, field) in fields.iter().enumerate() {
        if fields[..i].iter().any(|f| f.name == field.name) {
            return Err(ProgramError::Duplicate {
                kind,
                name: format!("{} field {}", owner, field.name),
            });
        }
    }
    Ok(())
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────
