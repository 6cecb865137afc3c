use crate::expression::Value;
use serde::{Deserialize, Serialize};

/// Methods the translator understands. Extension methods (queryable and
/// enumerable operators) receive their source as the first argument; instance
/// methods receive it as the call object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Method {
    // Queryable and enumerable operators.
    Where,
    Select,
    SelectMany,
    GroupBy,
    Join,
    GroupJoin,
    OrderBy,
    OrderByDescending,
    ThenBy,
    ThenByDescending,
    Skip,
    Take,
    SkipWhile,
    TakeWhile,
    Distinct,
    OfType,
    Concat,
    Union,
    Intersect,
    Except,
    Append,
    Prepend,
    DefaultIfEmpty,
    Reverse,
    Any,
    All,
    Count,
    LongCount,
    Contains,
    First,
    FirstOrDefault,
    Single,
    SingleOrDefault,
    Last,
    LastOrDefault,
    ElementAt,
    ElementAtOrDefault,
    Sum,
    Average,
    Min,
    Max,
    ToList,
    ToArray,
    AsQueryable,
    AsEnumerable,
    Repeat,
    Range,

    // String methods.
    ToLower,
    ToLowerInvariant,
    ToUpper,
    ToUpperInvariant,
    StringContains,
    StartsWith,
    EndsWith,
    IsNullOrEmpty,
    IsNullOrWhiteSpace,
    Substring,
    Trim,
    TrimStart,
    TrimEnd,
    IndexOf,
    Split,
    Replace,
    StringConcat,
    StringEquals,
    RegexIsMatch,
    ToString,

    // Math.
    Abs,
    Ceiling,
    Floor,
    Round,
    Pow,
    Sqrt,
    Log,
    Log10,
    Exp,
    Truncate,
    MathMin,
    MathMax,

    // DateTime.
    AddYears,
    AddMonths,
    AddDays,
    AddHours,
    AddMinutes,
    AddSeconds,
    AddMilliseconds,

    // Dictionaries and objects.
    ContainsKey,
    ContainsValue,
    Equals,
    GetType,
    GetValueOrDefault,

    // Non-deterministic.
    Now,
    UtcNow,
    NewGuid,
    RandomNext,
}

/// How a call is written in source form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallStyle {
    Extension,
    Instance,
    Static(&'static str),
}

impl Method {
    pub fn name(&self) -> &'static str {
        use Method::*;
        match self {
            Where => "Where",
            Select => "Select",
            SelectMany => "SelectMany",
            GroupBy => "GroupBy",
            Join => "Join",
            GroupJoin => "GroupJoin",
            OrderBy => "OrderBy",
            OrderByDescending => "OrderByDescending",
            ThenBy => "ThenBy",
            ThenByDescending => "ThenByDescending",
            Skip => "Skip",
            Take => "Take",
            SkipWhile => "SkipWhile",
            TakeWhile => "TakeWhile",
            Distinct => "Distinct",
            OfType => "OfType",
            Concat | StringConcat => "Concat",
            Union => "Union",
            Intersect => "Intersect",
            Except => "Except",
            Append => "Append",
            Prepend => "Prepend",
            DefaultIfEmpty => "DefaultIfEmpty",
            Reverse => "Reverse",
            Any => "Any",
            All => "All",
            Count => "Count",
            LongCount => "LongCount",
            Contains | StringContains => "Contains",
            First => "First",
            FirstOrDefault => "FirstOrDefault",
            Single => "Single",
            SingleOrDefault => "SingleOrDefault",
            Last => "Last",
            LastOrDefault => "LastOrDefault",
            ElementAt => "ElementAt",
            ElementAtOrDefault => "ElementAtOrDefault",
            Sum => "Sum",
            Average => "Average",
            Min | MathMin => "Min",
            Max | MathMax => "Max",
            ToList => "ToList",
            ToArray => "ToArray",
            AsQueryable => "AsQueryable",
            AsEnumerable => "AsEnumerable",
            Repeat => "Repeat",
            Range => "Range",
            ToLower => "ToLower",
            ToLowerInvariant => "ToLowerInvariant",
            ToUpper => "ToUpper",
            ToUpperInvariant => "ToUpperInvariant",
            StartsWith => "StartsWith",
            EndsWith => "EndsWith",
            IsNullOrEmpty => "IsNullOrEmpty",
            IsNullOrWhiteSpace => "IsNullOrWhiteSpace",
            Substring => "Substring",
            Trim => "Trim",
            TrimStart => "TrimStart",
            TrimEnd => "TrimEnd",
            IndexOf => "IndexOf",
            Split => "Split",
            Replace => "Replace",
            StringEquals | Equals => "Equals",
            RegexIsMatch => "IsMatch",
            ToString => "ToString",
            Abs => "Abs",
            Ceiling => "Ceiling",
            Floor => "Floor",
            Round => "Round",
            Pow => "Pow",
            Sqrt => "Sqrt",
            Log => "Log",
            Log10 => "Log10",
            Exp => "Exp",
            Truncate => "Truncate",
            AddYears => "AddYears",
            AddMonths => "AddMonths",
            AddDays => "AddDays",
            AddHours => "AddHours",
            AddMinutes => "AddMinutes",
            AddSeconds => "AddSeconds",
            AddMilliseconds => "AddMilliseconds",
            ContainsKey => "ContainsKey",
            ContainsValue => "ContainsValue",
            GetType => "GetType",
            GetValueOrDefault => "GetValueOrDefault",
            Now => "Now",
            UtcNow => "UtcNow",
            NewGuid => "NewGuid",
            RandomNext => "Next",
        }
    }

    pub fn call_style(&self) -> CallStyle {
        use Method::*;
        match self {
            Repeat | Range => CallStyle::Static("Enumerable"),
            IsNullOrEmpty | IsNullOrWhiteSpace | StringConcat => CallStyle::Static("string"),
            RegexIsMatch => CallStyle::Static("Regex"),
            Abs | Ceiling | Floor | Round | Pow | Sqrt | Log | Log10 | Exp | Truncate
            | MathMin | MathMax => CallStyle::Static("Math"),
            Now | UtcNow => CallStyle::Static("DateTime"),
            NewGuid => CallStyle::Static("Guid"),
            ToLower | ToLowerInvariant | ToUpper | ToUpperInvariant | StringContains
            | StartsWith | EndsWith | Substring | Trim | TrimStart | TrimEnd | IndexOf | Split
            | Replace | StringEquals | ToString | AddYears | AddMonths | AddDays | AddHours
            | AddMinutes | AddSeconds | AddMilliseconds | ContainsKey | ContainsValue | Equals
            | GetType | GetValueOrDefault | RandomNext => CallStyle::Instance,
            _ => CallStyle::Extension,
        }
    }

    /// Calls whose result differs between evaluations and therefore cannot be
    /// translated into a pipeline that is evaluated elsewhere.
    pub fn is_non_deterministic(&self) -> bool {
        matches!(
            self,
            Method::Now | Method::UtcNow | Method::NewGuid | Method::RandomNext
        )
    }

    /// Operators that end a query and turn it into a single value.
    pub fn is_terminal(&self) -> bool {
        use Method::*;
        matches!(
            self,
            Any | All
                | Count
                | LongCount
                | Contains
                | First
                | FirstOrDefault
                | Single
                | SingleOrDefault
                | Last
                | LastOrDefault
                | ElementAt
                | ElementAtOrDefault
                | Sum
                | Average
                | Min
                | Max
        )
    }
}

/// String comparison modes, with the ordinals used by .NET.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StringComparison {
    CurrentCulture = 0,
    CurrentCultureIgnoreCase = 1,
    InvariantCulture = 2,
    InvariantCultureIgnoreCase = 3,
    Ordinal = 4,
    OrdinalIgnoreCase = 5,
}

pub const STRING_COMPARISON_TYPE: &str = "StringComparison";

impl StringComparison {
    pub fn ignore_case(&self) -> bool {
        matches!(
            self,
            StringComparison::CurrentCultureIgnoreCase
                | StringComparison::InvariantCultureIgnoreCase
                | StringComparison::OrdinalIgnoreCase
        )
    }

    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Enum {
                type_name,
                ordinal,
            } if type_name == STRING_COMPARISON_TYPE => match ordinal {
                0 => Some(StringComparison::CurrentCulture),
                1 => Some(StringComparison::CurrentCultureIgnoreCase),
                2 => Some(StringComparison::InvariantCulture),
                3 => Some(StringComparison::InvariantCultureIgnoreCase),
                4 => Some(StringComparison::Ordinal),
                5 => Some(StringComparison::OrdinalIgnoreCase),
                _ => None,
            },
            _ => None,
        }
    }

    pub fn to_value(self) -> Value {
        Value::Enum {
            type_name: STRING_COMPARISON_TYPE.to_string(),
            ordinal: self as i64,
        }
    }
}
