use crate::util::unique_linked_hash_map::UniqueLinkedHashMap;
use bson::Bson;

#[derive(PartialEq, Debug, Clone, Default)]
pub struct Pipeline {
    pub stages: Vec<Stage>,
}

#[derive(PartialEq, Debug, Clone)]
pub enum Stage {
    Match(Match),
    Project(Project),
    Group(Group),
    Sort(Sort),
    Unwind(Unwind),
    Lookup(Lookup),
    Limit(Limit),
    Skip(Skip),
    UnionWith(UnionWith),
    Documents(Documents),
    ReplaceRoot(ReplaceRoot),
}

#[derive(PartialEq, Debug, Clone)]
pub struct Match {
    pub filter: Filter,
}

#[derive(PartialEq, Debug, Clone)]
pub struct Project {
    pub specifications: UniqueLinkedHashMap<String, ProjectItem>,
}

#[derive(PartialEq, Debug, Clone)]
pub enum ProjectItem {
    Exclusion,
    Inclusion,
    Assignment(Expression),
}

#[derive(PartialEq, Debug, Clone)]
pub struct Group {
    pub id: Expression,
    pub fields: Vec<AccumulatorField>,
}

#[derive(PartialEq, Debug, Clone)]
pub struct AccumulatorField {
    pub name: String,
    pub function: AccumulatorFunction,
    pub arg: Expression,
}

#[derive(PartialEq, Eq, Debug, Clone, Copy, Hash)]
pub enum AccumulatorFunction {
    AddToSet,
    Avg,
    First,
    Last,
    Max,
    Min,
    Push,
    StdDevPop,
    StdDevSamp,
    Sum,
}

#[derive(PartialEq, Debug, Clone)]
pub struct Sort {
    pub specs: Vec<SortSpecification>,
}

#[derive(PartialEq, Debug, Clone)]
pub enum SortSpecification {
    Asc(String),
    Desc(String),
}

#[derive(PartialEq, Debug, Clone)]
pub struct Unwind {
    /// Field path without the leading `$`.
    pub path: String,
    pub include_array_index: Option<String>,
    pub preserve_null_and_empty_arrays: bool,
}

#[derive(PartialEq, Debug, Clone)]
pub struct Lookup {
    pub from: String,
    pub local_field: String,
    pub foreign_field: String,
    pub as_var: String,
}

#[derive(PartialEq, Debug, Clone)]
pub struct Limit {
    pub limit: i64,
}

#[derive(PartialEq, Debug, Clone)]
pub struct Skip {
    pub skip: i64,
}

#[derive(PartialEq, Debug, Clone)]
pub struct UnionWith {
    pub collection: String,
    pub pipeline: Pipeline,
}

#[derive(PartialEq, Debug, Clone)]
pub struct Documents {
    pub documents: Vec<Expression>,
}

#[derive(PartialEq, Debug, Clone)]
pub struct ReplaceRoot {
    pub new_root: Expression,
}

/// Query-language predicates, the body of `$match`.
#[derive(PartialEq, Debug, Clone)]
pub enum Filter {
    /// `{}`
    MatchAll,
    /// `{ _id : { $type : -1 } }`: no document satisfies it.
    MatchNothing,
    Field(FieldFilter),
    And(Vec<Filter>),
    Or(Vec<Filter>),
    Nor(Vec<Filter>),
    Expr(Expression),
}

/// A predicate on one field. Inside `$elemMatch` an empty path denotes the
/// array element itself.
#[derive(PartialEq, Debug, Clone)]
pub struct FieldFilter {
    pub path: String,
    pub operation: FieldOperation,
}

#[derive(PartialEq, Debug, Clone)]
pub enum FieldOperation {
    Comparison(ComparisonOperator, Bson),
    In(Vec<Bson>),
    Nin(Vec<Bson>),
    Exists(bool),
    Type(String),
    Size(i64),
    Regex(bson::Regex),
    Mod { divisor: i64, remainder: i64 },
    ElemMatch(Box<Filter>),
    All(Vec<Bson>),
    Not(Box<FieldOperation>),
}

#[derive(PartialEq, Eq, Debug, Clone, Copy, Hash)]
pub enum ComparisonOperator {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
}

/// Aggregation expressions.
#[derive(PartialEq, Debug, Clone)]
pub enum Expression {
    Constant(Bson),
    /// A `$`-prefixed path such as `$A.B`, `$$ROOT` or `$$this.v`.
    FieldPath(String),
    Operator(Operator),
    Cond(Cond),
    Switch(Switch),
    Let(Let),
    Map(Map),
    Filter(ArrayFilter),
    Reduce(Reduce),
    Document(UniqueLinkedHashMap<String, Expression>),
    Array(Vec<Expression>),
    Convert(Convert),
    DateAdd(DateAdd),
    DatePart(DatePart),
    RegexMatch(RegexMatch),
    GetField(GetField),
    Trim(Trim),
    ReplaceAll(ReplaceAll),
    SortArray(SortArray),
}

#[derive(PartialEq, Debug, Clone)]
pub struct Operator {
    pub op: Op,
    pub args: Vec<Expression>,
}

#[derive(PartialEq, Eq, Debug, Clone, Copy, Hash)]
pub enum Op {
    // Arithmetic
    Add,
    Subtract,
    Multiply,
    Divide,
    Mod,
    Abs,
    Ceil,
    Floor,
    Round,
    Trunc,
    Pow,
    Sqrt,
    Exp,
    Ln,
    Log,
    Log10,

    // Comparison
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
    Cmp,

    // Boolean
    And,
    Or,
    Not,

    // String
    Concat,
    ToLower,
    ToUpper,
    StrLenCP,
    SubstrCP,
    IndexOfCP,
    Split,
    StrCaseCmp,

    // Array
    Size,
    ArrayElemAt,
    ConcatArrays,
    In,
    Slice,
    Range,
    ReverseArray,
    AllElementsTrue,
    AnyElementTrue,
    SetUnion,
    SetIntersection,
    SetDifference,
    SetIsSubset,
    ObjectToArray,
    ArrayToObject,
    First,
    Last,

    // Group-style operators usable on arrays
    Sum,
    Avg,
    Max,
    Min,

    // Miscellaneous
    IfNull,
    Type,
    IsArray,
    IsNumber,
    MergeObjects,
    BitAnd,
    BitOr,
    BitXor,
    Literal,
}

#[derive(PartialEq, Debug, Clone)]
pub struct Cond {
    pub condition: Box<Expression>,
    pub then: Box<Expression>,
    pub otherwise: Box<Expression>,
}

#[derive(PartialEq, Debug, Clone)]
pub struct Switch {
    pub branches: Vec<(Expression, Expression)>,
    pub default: Box<Expression>,
}

#[derive(PartialEq, Debug, Clone)]
pub struct Let {
    pub vars: Vec<LetVariable>,
    pub inside: Box<Expression>,
}

#[derive(PartialEq, Debug, Clone)]
pub struct LetVariable {
    pub name: String,
    pub expr: Box<Expression>,
}

#[derive(PartialEq, Debug, Clone)]
pub struct Map {
    pub input: Box<Expression>,
    pub as_var: String,
    pub inside: Box<Expression>,
}

#[derive(PartialEq, Debug, Clone)]
pub struct ArrayFilter {
    pub input: Box<Expression>,
    pub as_var: String,
    pub cond: Box<Expression>,
    pub limit: Option<Box<Expression>>,
}

/// `$reduce`. Inside, `$$value` is the accumulator and `$$this` the element.
#[derive(PartialEq, Debug, Clone)]
pub struct Reduce {
    pub input: Box<Expression>,
    pub initial_value: Box<Expression>,
    pub inside: Box<Expression>,
}

#[derive(PartialEq, Debug, Clone)]
pub struct Convert {
    pub input: Box<Expression>,
    pub to: BsonType,
    pub on_error: Option<Box<Expression>>,
    pub on_null: Option<Box<Expression>>,
}

#[derive(PartialEq, Eq, Debug, Clone, Copy, Hash)]
pub enum BsonType {
    Double,
    String,
    Object,
    Array,
    ObjectId,
    Bool,
    Date,
    Null,
    Int,
    Long,
    Decimal,
}

impl BsonType {
    pub fn as_str(&self) -> &'static str {
        match self {
            BsonType::Double => "double",
            BsonType::String => "string",
            BsonType::Object => "object",
            BsonType::Array => "array",
            BsonType::ObjectId => "objectId",
            BsonType::Bool => "bool",
            BsonType::Date => "date",
            BsonType::Null => "null",
            BsonType::Int => "int",
            BsonType::Long => "long",
            BsonType::Decimal => "decimal",
        }
    }
}

#[derive(PartialEq, Debug, Clone)]
pub struct DateAdd {
    pub start_date: Box<Expression>,
    pub unit: DateUnit,
    pub amount: Box<Expression>,
    pub timezone: Option<Box<Expression>>,
}

#[derive(PartialEq, Eq, Debug, Clone, Copy, Hash)]
pub enum DateUnit {
    Year,
    Quarter,
    Month,
    Week,
    Day,
    Hour,
    Minute,
    Second,
    Millisecond,
}

impl DateUnit {
    pub fn as_str(&self) -> &'static str {
        match self {
            DateUnit::Year => "year",
            DateUnit::Quarter => "quarter",
            DateUnit::Month => "month",
            DateUnit::Week => "week",
            DateUnit::Day => "day",
            DateUnit::Hour => "hour",
            DateUnit::Minute => "minute",
            DateUnit::Second => "second",
            DateUnit::Millisecond => "millisecond",
        }
    }
}

#[derive(PartialEq, Debug, Clone)]
pub struct DatePart {
    pub part: DatePartKind,
    pub date: Box<Expression>,
    pub timezone: Option<Box<Expression>>,
}

#[derive(PartialEq, Eq, Debug, Clone, Copy, Hash)]
pub enum DatePartKind {
    Year,
    Month,
    DayOfMonth,
    DayOfWeek,
    DayOfYear,
    Hour,
    Minute,
    Second,
    Millisecond,
    Week,
}

#[derive(PartialEq, Debug, Clone)]
pub struct RegexMatch {
    pub input: Box<Expression>,
    pub regex: String,
    pub options: String,
}

/// `$getField`, needed for field names that are not valid in a path.
#[derive(PartialEq, Debug, Clone)]
pub struct GetField {
    pub field: String,
    pub input: Box<Expression>,
}

#[derive(PartialEq, Eq, Debug, Clone, Copy, Hash)]
pub enum TrimKind {
    Both,
    Start,
    End,
}

#[derive(PartialEq, Debug, Clone)]
pub struct Trim {
    pub kind: TrimKind,
    pub input: Box<Expression>,
    pub chars: Option<Box<Expression>>,
}

#[derive(PartialEq, Debug, Clone)]
pub struct ReplaceAll {
    pub input: Box<Expression>,
    pub find: Box<Expression>,
    pub replacement: Box<Expression>,
}

#[derive(PartialEq, Debug, Clone)]
pub struct SortArray {
    pub input: Box<Expression>,
    pub sort_by: Bson,
}
